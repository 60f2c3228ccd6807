//! Delivery seam between the supervisor and the host application.
//!
//! The supervisor never knows where events go. It is handed an `EventSink`
//! and awaits `deliver` for every normalized envelope, which makes the send
//! back-pressure aware: a slow host slows the event loop down instead of
//! piling frames up in memory.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{error::SourceError, normalize::Envelope};

/// Destination for normalized events.
///
/// Implementations must be cheap to call repeatedly and must not panic;
/// a failed delivery is reported as `SourceError::SinkClosed` and the
/// supervisor drops the frame and keeps the session alive.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: Envelope) -> Result<(), SourceError>;
}

/// The standard sink: a bounded tokio channel into the host.
#[async_trait]
impl EventSink for mpsc::Sender<Envelope> {
    async fn deliver(&self, event: Envelope) -> Result<(), SourceError> {
        self.send(event)
            .await
            .map_err(|e| SourceError::SinkClosed(format!("queue receiver dropped: {e}")))
    }
}
