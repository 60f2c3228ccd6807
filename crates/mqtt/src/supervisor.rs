//! Session supervision: the resilient subscribe/decode/deliver loop.
//!
//! `SourceSupervisor` owns the whole lifecycle of the broker session. It
//! drives the rumqttc event loop, subscribes once the broker accepts the
//! session, normalizes every incoming PUBLISH into an `Envelope` and hands
//! it to the injected sink, and survives any transport failure with a
//! fixed-delay retry.
//!
//! There are exactly two ways out of `run()`:
//! - cancellation (the normal path, returns `Ok(())`);
//! - a fatal error where reconnecting cannot help (bad credentials,
//!   protocol refusal, local misconfiguration).
//!
//! Everything else (connection refused, broker restart, network drop,
//! idle timeout) is absorbed: log at WARN, wait the configured delay,
//! try again. Attempts are unbounded.
//!
//! # Usage
//!
//! ```ignore
//! let (tx, mut rx) = tokio::sync::mpsc::channel(256);
//! let cancel = CancellationToken::new();
//! let mut supervisor = SourceSupervisor::new(config, Arc::new(tx), cancel.clone())?;
//!
//! tokio::spawn(async move { supervisor.run().await });
//!
//! while let Some(envelope) = rx.recv().await {
//!     // host consumes normalized events
//! }
//! ```

use std::{future::Future, sync::Arc, time::Duration};

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Packet, QoS,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
    client::ClientBuilder, config::SourceConfig, error::SourceError, normalize::normalize_frame,
    retry::RetryPolicy, sink::EventSink, state::ConnectionState,
};

/// Supervises one broker subscription session end to end.
pub struct SourceSupervisor {
    /// Validated settings for this session.
    config: SourceConfig,

    /// Client handle for subscribes and the shutdown disconnect.
    client: AsyncClient,

    /// The event loop being driven; rumqttc re-dials on poll after errors.
    event_loop: EventLoop,

    /// Destination for normalized events.
    sink: Arc<dyn EventSink>,

    /// Fixed-delay retry controller.
    retry: RetryPolicy,

    /// Shutdown signal; the only terminal path for a healthy session.
    cancel: CancellationToken,

    /// Broadcast channel for lifecycle transitions.
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SourceSupervisor {
    /// Builds the client and wires the supervisor.
    ///
    /// Validates the configuration and loads TLS material, so every
    /// fail-fast condition surfaces here and `run()` only returns for
    /// cancellation or a mid-session fatal error.
    pub fn new(
        config: SourceConfig,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Result<Self, SourceError> {
        let (client, event_loop) = ClientBuilder::from_config(&config)?.build()?;
        let retry = RetryPolicy::new(Duration::from_secs(config.reconnect_delay));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        Ok(Self {
            config,
            client,
            event_loop,
            sink,
            retry,
            cancel,
            state_tx,
            state_rx,
        })
    }

    /// Subscribes to lifecycle transitions.
    ///
    /// The receiver sees the current state immediately and every change
    /// afterwards.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Publishes a state transition if it differs from the current one.
    fn update_state(&self, state: ConnectionState) {
        let changed = *self.state_tx.borrow() != state;
        if changed {
            info!("Source state: {state}");
            let _ = self.state_tx.send(state);
        }
    }

    /// Runs the session until cancelled or fatally broken.
    pub async fn run(&mut self) -> Result<(), SourceError> {
        info!(
            host = %self.config.host,
            port = self.config.port,
            topics = ?self.config.topics,
            "Starting MQTT event source"
        );
        self.update_state(ConnectionState::Connecting);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown signal received, closing session");
                    if let Err(e) = self.client.disconnect().await {
                        debug!("Disconnect on shutdown failed: {e}");
                    }
                    self.update_state(ConnectionState::Disconnected("cancelled".into()));
                    return Ok(());
                }

                polled = Self::poll_with_idle_guard(self.event_loop.poll(), self.config.idle_timeout) => {
                    match polled {
                        Ok(Some(event)) => self.handle_event(event).await,

                        // Idle window elapsed with no event-loop activity
                        Ok(None) => {
                            warn!(
                                "No activity for {}s, recycling the session",
                                self.config.idle_timeout.unwrap_or(0)
                            );
                            if let Err(e) = self.client.disconnect().await {
                                debug!("Disconnect after idle timeout failed: {e}");
                            }
                            if !self.pause_before_retry().await {
                                self.update_state(ConnectionState::Disconnected("cancelled".into()));
                                return Ok(());
                            }
                        }

                        Err(e) => {
                            if is_fatal_error(&e) {
                                error!("Fatal connection error, giving up: {}", get_error_message(&e));
                                self.update_state(ConnectionState::Disconnected(e.to_string()));
                                return Err(e.into());
                            }

                            warn!(
                                "Session failed ({}), retrying in {}s (attempt {})",
                                get_error_message(&e),
                                self.retry.delay().as_secs(),
                                self.retry.attempt() + 1,
                            );
                            if !self.pause_before_retry().await {
                                self.update_state(ConnectionState::Disconnected("cancelled".into()));
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }

    /// Awaits the next event-loop result, bounded by the idle window when
    /// one is set.
    ///
    /// `Ok(None)` means the idle window elapsed without any activity.
    async fn poll_with_idle_guard<F>(
        poll: F,
        idle_timeout: Option<u64>,
    ) -> Result<Option<Event>, ConnectionError>
    where
        F: Future<Output = Result<Event, ConnectionError>>,
    {
        match idle_timeout {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), poll).await {
                Ok(result) => result.map(Some),
                Err(_) => Ok(None),
            },
            None => poll.await.map(Some),
        }
    }

    /// Reacts to a single event from the broker.
    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Session established");
                    self.retry.reset();
                    self.update_state(ConnectionState::Streaming);
                    self.subscribe_all().await;
                }
            }

            Event::Incoming(Packet::Publish(publish)) => {
                trace!("Frame on {} ({} bytes)", publish.topic, publish.payload.len());
                let envelope = normalize_frame(&publish.topic, &publish.payload);
                if let Err(e) = self.sink.deliver(envelope).await {
                    // Keep the session: the host decides when to cancel
                    warn!("Dropping frame from {}: {e}", publish.topic);
                }
            }

            Event::Incoming(Packet::Disconnect) => {
                warn!("Disconnected by broker");
            }

            Event::Incoming(_) => {}

            Event::Outgoing(outgoing) => {
                trace!("Outgoing packet: {outgoing:?}");
            }
        }
    }

    /// Issues all configured subscriptions.
    ///
    /// A refused subscription is logged and skipped; the remaining filters
    /// still go through.
    async fn subscribe_all(&self) {
        let qos = qos_from_u8(self.config.qos);
        for topic in &self.config.topics {
            match self.client.subscribe(topic.clone(), qos).await {
                Ok(()) => debug!("Subscribed to {topic}"),
                Err(e) => warn!("Subscribe to {topic} failed: {e}"),
            }
        }
    }

    /// Waits out the retry delay. Returns `false` if cancelled meanwhile.
    async fn pause_before_retry(&mut self) -> bool {
        let delay = self.retry.next_sleep();
        self.update_state(ConnectionState::Reconnecting(delay.as_secs_f64()));

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Maps a config QoS number onto the protocol enum. Config validation
/// rejects values above 2; anything unexpected maps to QoS 0.
fn qos_from_u8(qos: u8) -> QoS {
    match qos {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    // Error is unrecoverable, reconnecting makes no sense
    Fatal,
    // Error is temporary, the retry loop handles it
    Reconnect,
}

pub(crate) fn classify_connection_error(err: &ConnectionError) -> Disposition {
    use Disposition::*;

    match err {
        // Mid-session failures arrive wrapped in the protocol state: a
        // broker restart or TCP reset is MqttState(Io(..)), a peer that
        // holds the socket open but stops answering is
        // MqttState(AwaitPingResp). A fresh session heals all of these.
        ConnectionError::MqttState(state) => match state {
            rumqttc::StateError::Io(e) => classify_io_kind(e),
            _ => Reconnect,
        },

        // Handshake failures usually mean the far side is restarting or
        // mid-renegotiation; retry like any other network error
        ConnectionError::Tls(_) => Reconnect,

        // A non-CONNACK reply to CONNECT is a protocol violation
        ConnectionError::NotConnAck(_) => Fatal,

        // The request channel is drained and closed; the client is gone
        ConnectionError::RequestsDone => Fatal,

        ConnectionError::Io(e) => classify_io_kind(e),

        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => Reconnect,

        ConnectionError::ConnectionRefused(code) => match code {
            // Credentials or protocol incompatibility will not heal
            ConnectReturnCode::RefusedProtocolVersion
            | ConnectReturnCode::BadClientId
            | ConnectReturnCode::BadUserNamePassword
            | ConnectReturnCode::NotAuthorized => Fatal,

            ConnectReturnCode::ServiceUnavailable => Reconnect,

            _ => Reconnect,
        },

        // Prefer reconnect for new or unexpected variants
        #[allow(unreachable_patterns)]
        _ => Reconnect,
    }
}

fn classify_io_kind(e: &std::io::Error) -> Disposition {
    use Disposition::*;

    match e.kind() {
        // Local misconfiguration, not a transient condition
        std::io::ErrorKind::AddrInUse
        | std::io::ErrorKind::PermissionDenied
        | std::io::ErrorKind::InvalidInput
        | std::io::ErrorKind::InvalidData => Fatal,

        _ => Reconnect,
    }
}

pub(crate) fn is_fatal_error(err: &ConnectionError) -> bool {
    matches!(classify_connection_error(err), Disposition::Fatal)
}

/// Extracts the innermost message from an error chain for compact logs.
pub(crate) fn get_error_message(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}
