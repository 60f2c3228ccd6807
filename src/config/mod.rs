//! Application configuration loading, validation, and management.
//!
//! The top-level `Config` aggregates logging and bridge settings. It loads
//! from a TOML file when one exists (`HIVEBRIDGE_CONFIG` or the default
//! path), falls back to builtin defaults otherwise, and then applies the
//! environment-variable surface the daemon is usually deployed with
//! (`HUE_BRIDGE_IP`, `HUE_KEY`, `MQTT_HOST`, ...). Validation runs last;
//! any violation, including the required application key being absent,
//! aborts startup before a single connection attempt.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use hivebridge_mqtt::TlsConfig;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use self::logger::LoggerConfig;

pub mod logger;

/// Simple macros for printing timestamped messages before the tracing
/// subscriber is initialized. Used during early configuration loading.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {{
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    }};
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {{
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    }};
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {{
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    }};
}

/// Errors that can occur during configuration loading, parsing, or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Generic configuration-related error with a descriptive message.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while accessing configuration files.
    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Failure to parse the TOML configuration file.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    /// Validation failure after successful parsing.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Logging subsystem configuration.
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// Event-stream and republish settings.
    #[validate(nested)]
    pub bridge: BridgeConfig,
}

impl Config {
    /// Constructs the configuration: file (optional) -> env overrides -> validate.
    pub fn new() -> Result<Self, ConfigError> {
        let mut config = match Self::get_config_path() {
            Some(path) => Self::load(&path)?,
            None => {
                print_info!("No configuration file found, using defaults with env overrides");
                Config::default()
            }
        };

        config.bridge.apply_env_overrides();
        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        Ok(config)
    }

    /// Determines the configuration file path, if any.
    ///
    /// Priority:
    /// 1. `HIVEBRIDGE_CONFIG` environment variable
    /// 2. `/etc/hivebridge/config.toml`
    ///
    /// A missing file is not an error here: the whole bridge surface can be
    /// driven by environment variables alone.
    fn get_config_path() -> Option<PathBuf> {
        if let Ok(config_path) = env::var("HIVEBRIDGE_CONFIG") {
            let path = PathBuf::from(config_path);
            print_info!("Using config from HIVEBRIDGE_CONFIG: {}", path.display());
            return Some(path);
        }

        let fallback = Path::new("/etc/hivebridge/config.toml");
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Some(fallback.to_path_buf());
        }

        None
    }

    /// Loads configuration from the specified path (without validating; the
    /// env overrides are still to come).
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config_str = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }
}

/// Settings for the event bridge: the SSE side, the MQTT side, and the
/// behavior knobs between them.
#[derive(Serialize, Deserialize, Debug, Validate, Clone)]
#[serde(default)]
pub struct BridgeConfig {
    /// Hue bridge address for the event stream.
    #[validate(length(min = 1, max = 255))]
    pub bridge_ip: String,

    /// Application key sent as `hue-application-key`. Required; there is no
    /// default and startup fails without it.
    #[validate(length(min = 1))]
    pub app_key: String,

    /// Verify the bridge's HTTPS certificate. Off by default: Hue bridges
    /// ship self-signed certificates.
    pub ssl_verify: bool,

    /// Tear down and re-dial the stream after this many seconds of silence.
    #[validate(range(min = 1))]
    pub idle_timeout: u64,

    /// Delay between reconnection attempts, in seconds.
    #[validate(range(min = 1, max = 3600))]
    pub reconnect_delay: u64,

    /// Log a one-line summary of every republished resource at INFO.
    pub event_log: bool,

    /// Outbound MQTT connection settings.
    #[validate(nested)]
    pub mqtt: MqttOutConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            bridge_ip: "192.168.1.71".to_string(),
            app_key: String::new(),
            ssl_verify: false,
            idle_timeout: 300,
            reconnect_delay: 5,
            event_log: true,
            mqtt: MqttOutConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Applies the env-var deployment surface on top of file/default values.
    pub fn apply_env_overrides(&mut self) {
        env_string("HUE_BRIDGE_IP", &mut self.bridge_ip);
        env_string("HUE_KEY", &mut self.app_key);
        env_bool("HUE_SSL_VERIFY", &mut self.ssl_verify);
        env_u64("HUE_SSE_IDLE_TIMEOUT", &mut self.idle_timeout);
        env_bool("EVENT_LOG", &mut self.event_log);

        env_string("MQTT_HOST", &mut self.mqtt.host);
        env_u16("MQTT_PORT", &mut self.mqtt.port);
        env_string_opt("MQTT_USER", &mut self.mqtt.username);
        env_string_opt("MQTT_PASS", &mut self.mqtt.password);
        env_string("MQTT_PREFIX", &mut self.mqtt.prefix);
        env_bool("MQTT_TLS_ENABLE", &mut self.mqtt.tls_enable);
        env_bool("MQTT_TLS_INSECURE", &mut self.mqtt.tls_insecure);
        env_string_opt("MQTT_TLS_CAFILE", &mut self.mqtt.tls_cafile);
    }

    /// The endpoint the event stream is read from.
    pub fn event_stream_url(&self) -> String {
        format!("https://{}/eventstream/clip/v2", self.bridge_ip)
    }
}

/// Outbound MQTT connection settings for the republish path.
#[derive(Serialize, Deserialize, Debug, Validate, Clone)]
#[serde(default)]
#[validate(schema(function = "validate_mqtt_out"))]
pub struct MqttOutConfig {
    /// Broker hostname or IP.
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    /// Broker port.
    #[validate(range(min = 1))]
    pub port: u16,

    /// Optional broker credentials.
    pub username: Option<String>,
    pub password: Option<String>,

    /// Topic prefix: the bundle goes to `{prefix}/raw`, resources to
    /// `{prefix}/{type}/{id}`.
    #[validate(length(min = 1), custom(function = "validate_prefix"))]
    pub prefix: String,

    /// MQTT client identifier.
    #[validate(length(min = 1, max = 36))]
    pub client_id: String,

    /// Enable TLS towards the broker.
    pub tls_enable: bool,

    /// Skip broker certificate verification (TLS mode only).
    pub tls_insecure: bool,

    /// CA certificate path for a verified TLS connection.
    pub tls_cafile: Option<String>,
}

impl Default for MqttOutConfig {
    fn default() -> Self {
        MqttOutConfig {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            prefix: "hue".to_string(),
            client_id: "hivebridge".to_string(),
            tls_enable: false,
            tls_insecure: false,
            tls_cafile: None,
        }
    }
}

impl MqttOutConfig {
    /// Maps the TLS knobs onto the transport library's `TlsConfig`.
    pub fn tls_config(&self) -> Option<TlsConfig> {
        if !self.tls_enable {
            return None;
        }
        if self.tls_insecure {
            return Some(TlsConfig::insecure());
        }
        self.tls_cafile
            .as_ref()
            .map(|ca| TlsConfig::with_ca_only(ca.clone()))
    }
}

/// TLS in verified mode needs a CA file to verify against.
fn validate_mqtt_out(config: &MqttOutConfig) -> Result<(), ValidationError> {
    if config.tls_enable && !config.tls_insecure && config.tls_cafile.is_none() {
        let mut err = ValidationError::new("tls_missing_cafile");
        err.message = Some("MQTT TLS requires tls_cafile unless tls_insecure is set".into());
        return Err(err);
    }
    if let Some(cafile) = &config.tls_cafile {
        if !Path::new(cafile).exists() {
            let mut err = ValidationError::new("file_not_found");
            err.message = Some(format!("File does not exist: {cafile}").into());
            return Err(err);
        }
    }
    Ok(())
}

/// Topic prefixes must not produce empty topic levels.
fn validate_prefix(prefix: &str) -> Result<(), ValidationError> {
    if prefix.starts_with('/') || prefix.ends_with('/') {
        let mut err = ValidationError::new("invalid_prefix");
        err.message = Some("Topic prefix must not start or end with '/'".into());
        return Err(err);
    }
    Ok(())
}

fn env_string(key: &str, target: &mut String) {
    if let Ok(value) = env::var(key) {
        *target = value;
    }
}

fn env_string_opt(key: &str, target: &mut Option<String>) {
    if let Ok(value) = env::var(key) {
        *target = if value.is_empty() { None } else { Some(value) };
    }
}

fn env_bool(key: &str, target: &mut bool) {
    if let Ok(value) = env::var(key) {
        *target = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
    }
}

fn env_u64(key: &str, target: &mut u64) {
    if let Ok(value) = env::var(key) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => print_warn!("Ignoring non-numeric {key}={value}"),
        }
    }
}

fn env_u16(key: &str, target: &mut u16) {
    if let Ok(value) = env::var(key) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => print_warn!("Ignoring non-numeric {key}={value}"),
        }
    }
}
