//! Daemon entry point: configuration, logging, and the two connection loops.

use std::{sync::OnceLock, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hivebridge::{
    config::Config,
    core::{relay::BundleRelay, sse::SseSource},
    logger::LoggerManager,
    print_error,
};
use hivebridge_mqtt::{ClientBuilder, ConnectionDriver};

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Loads the configuration once; any failure aborts the process.
fn config() -> &'static Config {
    CONFIG.get_or_init(|| match Config::new() {
        Ok(config) => config,
        Err(e) => {
            print_error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    })
}

#[tokio::main]
async fn main() {
    let config = config();

    let mut logger = match LoggerManager::new(config.logger.clone()) {
        Ok(logger) => logger,
        Err(e) => {
            print_error!("Invalid logger configuration: {}", e);
            std::process::exit(2);
        }
    };
    if let Err(e) = logger.init() {
        print_error!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    info!("Starting hivebridge v{}", env!("CARGO_PKG_VERSION"));

    let mqtt = &config.bridge.mqtt;
    let mut builder = ClientBuilder::new(mqtt.client_id.clone(), mqtt.host.clone(), mqtt.port)
        .keep_alive(60);
    if let (Some(username), Some(password)) = (&mqtt.username, &mqtt.password) {
        builder = builder.credentials(username.clone(), password.clone());
    }
    if let Some(tls) = mqtt.tls_config() {
        builder = builder.with_tls(tls);
    }

    let (client, event_loop) = match builder.build() {
        Ok(pair) => pair,
        Err(e) => {
            error!("Failed to set up MQTT transport: {e}");
            std::process::exit(3);
        }
    };

    let cancel = CancellationToken::new();
    let mut driver = ConnectionDriver::new(
        client.clone(),
        event_loop,
        Duration::from_secs(config.bridge.reconnect_delay),
        cancel.clone(),
    );
    let mut driver_handle = tokio::spawn(async move { driver.run().await });

    let relay = BundleRelay::new(client, mqtt.prefix.clone(), config.bridge.event_log);
    let mut source = match SseSource::new(&config.bridge, relay, cancel.clone()) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to set up event stream client: {e}");
            std::process::exit(3);
        }
    };

    tokio::select! {
        _ = source.run() => {
            info!("Event stream loop ended");
        }
        result = &mut driver_handle => {
            match result {
                Ok(Err(e)) => error!("Outbound MQTT connection failed: {e}"),
                Ok(Ok(())) => info!("Outbound MQTT connection closed"),
                Err(e) => error!("Outbound MQTT task panicked: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            cancel.cancel();
            // Give the connection loops a moment to disconnect cleanly.
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
    }

    info!("hivebridge stopped");
}
