//! Core bridge functionality: the SSE event-stream reader, the resource
//! summarizer, and the MQTT republish relay.

use thiserror::Error;

pub mod relay;
pub mod sse;
pub mod summary;

/// Errors raised while reading the event stream or republishing events.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// HTTP-level failure while connecting to or reading the event stream.
    #[error("Event stream HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No bytes arrived on the stream within the configured window.
    #[error("Event stream idle for {0} seconds, reconnecting")]
    IdleTimeout(u64),

    /// The bridge closed the stream without an error.
    #[error("Event stream ended")]
    StreamClosed,

    /// Setup failure before the stream could be opened.
    #[error("Bridge setup error: {0}")]
    Setup(String),

    /// Failure bubbling up from the MQTT transport layer.
    #[error(transparent)]
    Source(#[from] hivebridge_mqtt::SourceError),
}
