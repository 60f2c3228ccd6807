//! Observable connection state for the event source.
//!
//! The supervisor publishes every lifecycle transition on a watch channel so
//! that host applications can react to connectivity changes (pause consumers,
//! surface status, alert on long outages) without polling.

use std::fmt;

/// Current state of the bridged session.
///
/// The lifecycle flows through these states:
/// - `Connecting` -> `Streaming` (broker accepted the session, subscriptions active)
/// - `Streaming` -> `Reconnecting` (transport failure or idle timeout)
/// - `Reconnecting` -> `Connecting` -> ... (fixed-delay retry loop, unbounded)
/// - any state -> `Disconnected` (cancellation, or a fatal error)
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Session establishment in progress; nothing is flowing yet.
    Connecting,

    /// Connected with active subscriptions; frames are being relayed.
    Streaming,

    /// Waiting out the fixed delay before the next connection attempt.
    ///
    /// The `f64` field is the delay in seconds. The delay does not grow
    /// between attempts and there is no attempt cap; a sustained outage
    /// keeps the source in a `Reconnecting`/`Connecting` cycle until it
    /// heals or the source is cancelled.
    Reconnecting(f64),

    /// The session is over and no further attempt will be made.
    ///
    /// The `String` field carries the reason: "cancelled" for a requested
    /// shutdown, otherwise the fatal error that ended the session.
    Disconnected(String),
}

impl ConnectionState {
    /// Short static identifier for logging and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Streaming => "Streaming",
            ConnectionState::Reconnecting(_) => "Reconnecting",
            ConnectionState::Disconnected(_) => "Disconnected",
        }
    }

    /// Contextual details for the current state.
    ///
    /// Empty for `Connecting` and `Streaming`; the retry delay for
    /// `Reconnecting`; the termination reason for `Disconnected`.
    pub fn details(&self) -> String {
        match self {
            ConnectionState::Connecting | ConnectionState::Streaming => String::new(),
            ConnectionState::Reconnecting(seconds) => format!("in {seconds} seconds"),
            ConnectionState::Disconnected(reason) => reason.clone(),
        }
    }

    /// True only while frames can actually flow.
    pub fn is_streaming(&self) -> bool {
        matches!(self, ConnectionState::Streaming)
    }

    /// True while the source is still trying to establish a session.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting(_)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())?;
        let details = self.details();
        if !details.is_empty() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_as_str() {
        assert_eq!(ConnectionState::Connecting.as_str(), "Connecting");
        assert_eq!(ConnectionState::Streaming.as_str(), "Streaming");
        assert_eq!(ConnectionState::Reconnecting(5.0).as_str(), "Reconnecting");
        assert_eq!(
            ConnectionState::Disconnected("cancelled".into()).as_str(),
            "Disconnected"
        );
    }

    #[test]
    fn test_state_details() {
        assert_eq!(ConnectionState::Connecting.details(), "");
        assert_eq!(ConnectionState::Streaming.details(), "");
        assert_eq!(ConnectionState::Reconnecting(5.0).details(), "in 5 seconds");
        assert_eq!(
            ConnectionState::Disconnected("network error".into()).details(),
            "network error"
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Streaming.to_string(), "Streaming");
        assert_eq!(
            ConnectionState::Reconnecting(5.0).to_string(),
            "Reconnecting (in 5 seconds)"
        );
        assert_eq!(
            ConnectionState::Disconnected("broker closed".into()).to_string(),
            "Disconnected (broker closed)"
        );
    }

    #[test]
    fn test_is_streaming() {
        assert!(ConnectionState::Streaming.is_streaming());
        assert!(!ConnectionState::Connecting.is_streaming());
        assert!(!ConnectionState::Reconnecting(5.0).is_streaming());
    }

    #[test]
    fn test_is_connecting() {
        assert!(ConnectionState::Connecting.is_connecting());
        assert!(ConnectionState::Reconnecting(5.0).is_connecting());
        assert!(!ConnectionState::Streaming.is_connecting());
        assert!(!ConnectionState::Disconnected("done".into()).is_connecting());
    }
}
