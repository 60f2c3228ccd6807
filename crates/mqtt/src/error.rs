//! Unified error handling for the MQTT event source.
//!
//! This module defines `SourceError`, the error type shared by every operation
//! in this crate. It aggregates failures from multiple layers (configuration,
//! TLS material loading, the network connection, sink delivery) into a single
//! type that host applications can pattern-match on.
//!
//! # Error Categories
//!
//! **Startup errors** (caught before the first connection attempt, fail fast):
//! - `Config`: Validation failures in `SourceConfig`
//! - `ClientSetup`: Issues initializing the client
//! - `TlsMaterial`: Certificate or key files missing, unreadable, or malformed
//! - `Io`: File I/O while loading TLS material
//!
//! **Runtime errors**:
//! - `Connection`: Network-level connection error surfaced by the event loop.
//!   Most of these are transient and handled by the supervisor's retry loop;
//!   only the fatal subset (bad credentials, protocol violation) reaches the
//!   caller.
//! - `ClientRequest`: The local client could not queue a subscribe/disconnect
//! - `SinkClosed`: The injected event sink rejected a delivery because its
//!   receiving side is gone
//!
//! # Usage
//!
//! ```ignore
//! match supervisor.run().await {
//!     Ok(()) => info!("source cancelled, shutting down"),
//!     Err(SourceError::Config(e)) => {
//!         // Bad settings: surface and exit, retrying cannot help
//!         error!("invalid source configuration: {e}");
//!     }
//!     Err(e) => error!("source stopped: {e}"),
//! }
//! ```

use thiserror::Error;

/// The unified error type for MQTT event-source operations.
///
/// Transient connectivity problems never surface as values of this type:
/// the supervisor absorbs them and retries. A returned `SourceError` means
/// either startup failed or the session hit a condition where reconnecting
/// cannot succeed.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Configuration validation failed.
    ///
    /// The `SourceConfig` struct carries validation rules (via the `validator`
    /// crate) for host length, port range, topic filters, keep-alive bounds
    /// and TLS file presence. Fix the configuration and restart; this is
    /// always a startup failure.
    #[error("Configuration error: {0}")]
    Config(#[from] validator::ValidationErrors),

    /// MQTT client initialization failed.
    ///
    /// Typically a malformed host/port combination or an inconsistent TLS
    /// block. Caught at startup, never mid-session.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// TLS certificate or key material could not be loaded or parsed.
    ///
    /// The paths were validated to exist, but the contents were not PEM,
    /// or the key file held no usable private key.
    #[error("TLS material error: {0}")]
    TlsMaterial(String),

    /// The connection to the broker failed in a way that retrying cannot fix.
    ///
    /// Examples: credentials rejected, protocol version refused, local
    /// address misconfiguration. Transient variants of the same underlying
    /// rumqttc error are absorbed by the supervisor and never escape.
    ///
    /// Boxed to keep the enum small; `ConnectionError` is large.
    #[error("Connection error: {0}")]
    Connection(#[from] Box<rumqttc::ConnectionError>),

    /// The local client could not queue a request (subscribe, disconnect).
    ///
    /// Usually means the event loop task is gone, which only happens during
    /// shutdown.
    #[error("Client request error: {0}")]
    ClientRequest(#[from] rumqttc::ClientError),

    /// The injected event sink refused a delivery.
    ///
    /// The receiving side of the sink has been dropped. The supervisor logs
    /// and drops the frame; the host is expected to cancel the source when
    /// it tears down its queue.
    #[error("Event sink closed: {0}")]
    SinkClosed(String),

    /// File I/O failed while loading TLS material.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Boxes rumqttc's `ConnectionError` on conversion so the `?` operator works
/// directly against event-loop results without bloating `SourceError`.
impl From<rumqttc::ConnectionError> for SourceError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        SourceError::Connection(Box::new(err))
    }
}
