//! Outbound connection driver for publish-only sessions.
//!
//! The republish side of a bridge needs the opposite of `SourceSupervisor`:
//! no subscriptions, no decoding, just a client that stays connected so that
//! fire-and-forget publishes have somewhere to go. `ConnectionDriver` keeps
//! the event loop polled (rumqttc re-dials on the next poll after a failure)
//! and applies the same fixed-delay pacing and fatal-error classification as
//! the source side.
//!
//! Publishers hold a cloned `AsyncClient` and publish whenever they like;
//! while the connection is down, QoS 0 messages are simply lost, which is
//! the delivery contract of the republish path.

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Packet};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
    error::SourceError,
    retry::RetryPolicy,
    state::ConnectionState,
    supervisor::{get_error_message, is_fatal_error},
};

/// Keeps a publish-only broker session alive until cancelled.
pub struct ConnectionDriver {
    client: AsyncClient,
    event_loop: EventLoop,
    retry: RetryPolicy,
    cancel: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionDriver {
    /// Wraps an already-built client/event-loop pair.
    pub fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        reconnect_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        Self {
            client,
            event_loop,
            retry: RetryPolicy::new(reconnect_delay),
            cancel,
            state_tx,
            state_rx,
        }
    }

    /// A clonable handle for publishing alongside the running driver.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Subscribes to lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    fn update_state(&self, state: ConnectionState) {
        let changed = *self.state_tx.borrow() != state;
        if changed {
            info!("Publisher state: {state}");
            let _ = self.state_tx.send(state);
        }
    }

    /// Drives the event loop until cancelled or fatally broken.
    pub async fn run(&mut self) -> Result<(), SourceError> {
        info!("Starting outbound MQTT connection");
        self.update_state(ConnectionState::Connecting);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown signal received, closing outbound connection");
                    if let Err(e) = self.client.disconnect().await {
                        debug!("Disconnect on shutdown failed: {e}");
                    }
                    self.update_state(ConnectionState::Disconnected("cancelled".into()));
                    return Ok(());
                }

                polled = self.event_loop.poll() => {
                    match polled {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                            if ack.code == ConnectReturnCode::Success {
                                info!("Outbound connection established");
                                self.retry.reset();
                                self.update_state(ConnectionState::Streaming);
                            }
                        }
                        Ok(Event::Incoming(Packet::Disconnect)) => {
                            warn!("Outbound connection closed by broker");
                        }
                        Ok(event) => {
                            trace!("Outbound event: {event:?}");
                        }
                        Err(e) => {
                            if is_fatal_error(&e) {
                                error!(
                                    "Fatal outbound connection error, giving up: {}",
                                    get_error_message(&e)
                                );
                                self.update_state(ConnectionState::Disconnected(e.to_string()));
                                return Err(e.into());
                            }

                            let delay = self.retry.next_sleep();
                            warn!(
                                "Outbound connection failed ({}), retrying in {}s (attempt {})",
                                get_error_message(&e),
                                delay.as_secs(),
                                self.retry.attempt(),
                            );
                            self.update_state(ConnectionState::Reconnecting(delay.as_secs_f64()));

                            tokio::select! {
                                _ = self.cancel.cancelled() => {
                                    self.update_state(ConnectionState::Disconnected("cancelled".into()));
                                    return Ok(());
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::client::ClientBuilder;

    fn test_driver(cancel: CancellationToken) -> ConnectionDriver {
        let (client, event_loop) = ClientBuilder::new("test_driver", "localhost", 1883)
            .build()
            .unwrap();
        ConnectionDriver::new(client, event_loop, Duration::from_secs(5), cancel)
    }

    #[tokio::test]
    async fn test_initial_state_is_connecting() {
        let driver = test_driver(CancellationToken::new());
        assert_eq!(*driver.subscribe_state().borrow(), ConnectionState::Connecting);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_run_exits_cleanly_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut driver = test_driver(cancel);

        assert!(driver.run().await.is_ok());
        assert!(logs_contain("Shutdown signal received"));
    }

    #[tokio::test]
    async fn test_client_handle_is_clonable() {
        let driver = test_driver(CancellationToken::new());
        let a = driver.client();
        let b = driver.client();
        // Both handles feed the same request channel
        drop(a);
        drop(b);
    }
}
