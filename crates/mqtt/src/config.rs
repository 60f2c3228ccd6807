//! Configuration for the MQTT event source.
//!
//! All settings are plain serde structs with validation rules attached via
//! the `validator` crate. Hosts load them from TOML (or build them in code)
//! and call `validate()` before handing them to the supervisor; any violation
//! is a startup error, never something discovered mid-session.

use std::path::Path;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::retry::DEFAULT_RECONNECT_DELAY_SECS;

/// Settings for one broker subscription session.
///
/// # Example (TOML)
///
/// ```toml
/// host = "broker.lan"
/// port = 8883
/// topics = ["zigbee2mqtt/#", "sensors/+/state"]
/// username = "bridge"
/// password = "secret"
/// reconnect_delay = 5
///
/// [tls]
/// ca_cert_path = "/etc/hivebridge/ca.pem"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SourceConfig {
    /// Broker hostname or IP address.
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    /// Broker port (1883 plain, 8883 TLS by convention).
    #[validate(range(min = 1))]
    pub port: u16,

    /// Topic filters to subscribe to. Must not be empty; wildcards allowed.
    #[validate(length(min = 1), custom(function = "validate_topic_filters"))]
    pub topics: Vec<String>,

    /// Optional broker username.
    pub username: Option<String>,

    /// Optional broker password. Only meaningful together with `username`.
    pub password: Option<String>,

    /// MQTT client identifier (1-36 characters, broker-safe length).
    #[validate(length(min = 1, max = 36))]
    pub client_id: String,

    /// Keep-alive interval in seconds.
    #[validate(range(min = 5, max = 3600))]
    pub keep_alive: u64,

    /// Delay between reconnection attempts, in seconds. The delay is
    /// constant; attempts are unbounded.
    #[validate(range(min = 1, max = 3600))]
    pub reconnect_delay: u64,

    /// Optional idle window in seconds. If the event loop produces nothing
    /// for this long, the session is torn down and re-established. Off by
    /// default: MQTT keep-alive already bounds broker silence.
    pub idle_timeout: Option<u64>,

    /// Subscription QoS (0, 1 or 2). Delivered frames keep the QoS the
    /// broker sent them with.
    #[validate(range(max = 2))]
    pub qos: u8,

    /// Optional TLS settings. Presence of the block enables TLS.
    #[validate(nested)]
    pub tls: Option<TlsConfig>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            host: "localhost".to_string(),
            port: 1883,
            topics: vec!["#".to_string()],
            username: None,
            password: None,
            client_id: "hivebridge-source".to_string(),
            keep_alive: 60,
            reconnect_delay: DEFAULT_RECONNECT_DELAY_SECS,
            idle_timeout: None,
            qos: 0,
            tls: None,
        }
    }
}

/// Checks that no topic filter is blank.
fn validate_topic_filters(topics: &[String]) -> Result<(), ValidationError> {
    if topics.iter().any(|t| t.trim().is_empty()) {
        let mut err = ValidationError::new("invalid_topic_filter");
        err.message = Some("Topic filters must not be empty".into());
        return Err(err);
    }
    Ok(())
}

/// TLS settings for the broker connection.
///
/// Two shapes are supported:
/// - verified: `ca_cert_path` (plus an optional client cert/key pair for
///   mutual TLS), server certificate checked against the CA;
/// - `insecure: true`: certificate and hostname verification disabled.
///   Meant for brokers with self-signed certificates on a trusted LAN;
///   the supervisor logs a warning when this is active.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_tls_shape"))]
pub struct TlsConfig {
    /// Path to the CA certificate (PEM). Required unless `insecure` is set.
    #[validate(custom(function = "validate_file_path"))]
    pub ca_cert_path: Option<String>,

    /// Path to the client certificate (PEM), for mutual TLS.
    #[validate(custom(function = "validate_file_path"))]
    pub client_cert_path: Option<String>,

    /// Path to the client private key (PEM, unencrypted).
    #[validate(custom(function = "validate_file_path"))]
    pub client_key_path: Option<String>,

    /// Disable certificate and hostname verification.
    pub insecure: bool,
}

impl TlsConfig {
    /// Builds a verified configuration with mutual TLS.
    pub fn new(
        ca_cert_path: impl Into<String>,
        client_cert_path: impl Into<String>,
        client_key_path: impl Into<String>,
    ) -> Self {
        TlsConfig {
            ca_cert_path: Some(ca_cert_path.into()),
            client_cert_path: Some(client_cert_path.into()),
            client_key_path: Some(client_key_path.into()),
            insecure: false,
        }
    }

    /// Builds a verified configuration with only a CA certificate.
    pub fn with_ca_only(ca_cert_path: impl Into<String>) -> Self {
        TlsConfig {
            ca_cert_path: Some(ca_cert_path.into()),
            client_cert_path: None,
            client_key_path: None,
            insecure: false,
        }
    }

    /// Builds a configuration that skips all verification.
    pub fn insecure() -> Self {
        TlsConfig {
            insecure: true,
            ..TlsConfig::default()
        }
    }

    /// True when a client certificate/key pair is configured.
    pub fn has_client_auth(&self) -> bool {
        self.client_cert_path.is_some() && self.client_key_path.is_some()
    }
}

/// Cross-field rules: CA required unless insecure; cert and key come in pairs.
fn validate_tls_shape(tls: &TlsConfig) -> Result<(), ValidationError> {
    if tls.ca_cert_path.is_none() && !tls.insecure {
        let mut err = ValidationError::new("tls_missing_ca");
        err.message = Some("TLS requires ca_cert_path unless insecure is set".into());
        return Err(err);
    }
    if tls.client_cert_path.is_some() != tls.client_key_path.is_some() {
        let mut err = ValidationError::new("tls_partial_client_auth");
        err.message =
            Some("client_cert_path and client_key_path must be provided together".into());
        return Err(err);
    }
    Ok(())
}

/// Checks that a configured path exists on disk.
fn validate_file_path(path: &str) -> Result<(), ValidationError> {
    if !Path::new(path).exists() {
        let mut err = ValidationError::new("file_not_found");
        err.message = Some(format!("File does not exist: {path}").into());
        return Err(err);
    }
    Ok(())
}
