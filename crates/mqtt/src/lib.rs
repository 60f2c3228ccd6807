//! # hivebridge-mqtt: resilient MQTT event source
//!
//! An async MQTT subscription layer for event bridges, built on `rumqttc`.
//! It connects to a broker, subscribes to a set of topic filters, normalizes
//! every incoming message into a canonical `{topic, payload}` envelope, and
//! delivers envelopes into a sink the host application injects. On top of
//! that it adds:
//!
//! - **Unbounded reconnection** with a fixed, configurable delay (default 5s)
//! - **Idle-timeout detection** that recycles a silently dead session
//! - **Payload normalization** that never fails: lossy UTF-8, JSON parse
//!   with text fallback, and an all-string envelope degrade path
//! - **State monitoring** via watch channels
//! - **TLS** with CA/mutual-TLS verification or an explicit insecure mode
//! - **Cooperative cancellation** as the only terminal path
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use hivebridge_mqtt::{SourceConfig, SourceSupervisor};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> hivebridge_mqtt::Result<()> {
//!     let config = SourceConfig {
//!         host: "broker.lan".into(),
//!         topics: vec!["zigbee2mqtt/#".into()],
//!         ..Default::default()
//!     };
//!
//!     let (tx, mut rx) = tokio::sync::mpsc::channel(256);
//!     let cancel = CancellationToken::new();
//!     let mut supervisor = SourceSupervisor::new(config, Arc::new(tx), cancel.clone())?;
//!
//!     tokio::spawn(async move { supervisor.run().await });
//!
//!     while let Some(envelope) = rx.recv().await {
//!         println!("{} -> {}", envelope.topic, envelope.payload);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Connection Lifecycle
//!
//! ```text
//! Connecting ──(CONNACK)──> Streaming
//!                              │
//!                    (failure / idle timeout)
//!                              │
//!                              ▼
//!                      Reconnecting(secs)
//!                              │
//!                     (fixed delay elapsed)
//!                              │
//!                              ▼
//!                          Connecting
//! ```
//!
//! The loop has no attempt cap; `Disconnected` is reached only through
//! cancellation or a fatal error (bad credentials, protocol refusal,
//! broken TLS material).
//!
//! # Delivery contract
//!
//! Envelopes are delivered in arrival order, one at a time, with the send
//! awaited, so a slow host back-pressures the event loop instead of growing
//! a buffer. A malformed frame never kills the session: payloads that are
//! not JSON arrive as strings, and binary junk arrives lossily decoded.

// Module declarations
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod normalize;
pub mod retry;
pub mod sink;
pub mod state;
pub mod supervisor;

// Re-exports: the common entry points
pub use client::ClientBuilder;
pub use config::{SourceConfig, TlsConfig};
pub use driver::ConnectionDriver;
pub use error::SourceError;
pub use normalize::{decode_payload, normalize_frame, Envelope};
pub use retry::RetryPolicy;
pub use sink::EventSink;
pub use state::ConnectionState;
pub use supervisor::SourceSupervisor;

/// Result type for event-source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
