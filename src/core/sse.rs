//! Server-sent event stream reader for the Hue bridge.
//!
//! The bridge exposes a long-lived `text/event-stream` endpoint at
//! `/eventstream/clip/v2`. Each event carries a JSON array (a "bundle") on
//! its `data:` line; keep-alive comments (`: hi`) arrive between events.
//! `SseSource` owns the outer reconnect loop: a stream that errors, closes,
//! or goes silent past the idle window is torn down and re-dialed after a
//! fixed pause, forever, until cancellation.

use futures_util::{Stream, StreamExt};
use hivebridge_mqtt::RetryPolicy;
use serde_json::Value;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    config::BridgeConfig,
    core::{relay::BundleRelay, BridgeError},
};

/// A classified line of an SSE stream.
#[derive(Debug, PartialEq)]
pub enum SseLine<'a> {
    /// `data:` payload line.
    Data(&'a str),
    /// `event:` name line.
    Event(&'a str),
    /// Comment line, used by the bridge as a keep-alive.
    Comment(&'a str),
    /// Event-terminating blank line.
    Blank,
    /// Any other field line (`id:`, `retry:`, ...), ignored.
    Other(&'a str),
}

/// Classifies one line of an SSE stream.
///
/// Splitting and `\r` trimming happen upstream; this only looks at the
/// field prefix. A single optional space after the colon is stripped from
/// `data:` and `event:` values per the SSE wire format.
pub fn classify_line(line: &str) -> SseLine<'_> {
    if line.is_empty() {
        return SseLine::Blank;
    }
    if let Some(rest) = line.strip_prefix("data:") {
        return SseLine::Data(rest.strip_prefix(' ').unwrap_or(rest));
    }
    if let Some(rest) = line.strip_prefix("event:") {
        return SseLine::Event(rest.strip_prefix(' ').unwrap_or(rest));
    }
    if let Some(rest) = line.strip_prefix(':') {
        return SseLine::Comment(rest);
    }
    SseLine::Other(line)
}

/// Reads the bridge's event stream and hands bundles to the relay.
pub struct SseSource {
    client: reqwest::Client,
    relay: BundleRelay,
    retry: RetryPolicy,
    cancel: CancellationToken,
    url: String,
    app_key: String,
    idle_timeout: u64,
}

impl SseSource {
    pub fn new(
        config: &BridgeConfig,
        relay: BundleRelay,
        cancel: CancellationToken,
    ) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.ssl_verify)
            .build()?;

        Ok(SseSource {
            client,
            relay,
            retry: RetryPolicy::new(Duration::from_secs(config.reconnect_delay)),
            cancel,
            url: config.event_stream_url(),
            app_key: config.app_key.clone(),
            idle_timeout: config.idle_timeout,
        })
    }

    /// Runs the reconnect loop until cancelled.
    pub async fn run(&mut self) {
        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received, stopping event stream");
                    return;
                }
                result = self.stream_once() => {
                    match result {
                        Ok(()) => return,
                        Err(e) => warn!(error = %e, "Event stream interrupted"),
                    }
                }
            }

            let delay = self.retry.next_sleep();
            info!(attempt = self.retry.attempt(), delay_secs = delay.as_secs(),
                "Reconnecting to event stream");
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Shutdown signal received, stopping event stream");
                    return;
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// Opens the stream and consumes it until it errors, closes, or idles out.
    async fn stream_once(&mut self) -> Result<(), BridgeError> {
        info!(url = %self.url, "Connecting to event stream");
        let response = self
            .client
            .get(&self.url)
            .header("hue-application-key", &self.app_key)
            .header("Accept", "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        info!("Event stream connected");
        self.retry.reset();

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let idle = Duration::from_secs(self.idle_timeout);

        loop {
            let chunk = Self::next_with_idle_guard(&mut stream, idle).await??;

            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw[..pos]);
                self.handle_line(line.trim_end_matches('\r')).await;
            }
        }
    }

    /// Waits for the next stream item, bounding the wait by the idle window.
    ///
    /// A window with no traffic at all means the connection is dead even if
    /// the socket never errored; it is reported as `IdleTimeout` so the outer
    /// loop re-dials.
    async fn next_with_idle_guard<S>(stream: &mut S, idle: Duration) -> Result<S::Item, BridgeError>
    where
        S: Stream + Unpin,
    {
        match timeout(idle, stream.next()).await {
            Err(_) => Err(BridgeError::IdleTimeout(idle.as_secs())),
            Ok(None) => Err(BridgeError::StreamClosed),
            Ok(Some(item)) => Ok(item),
        }
    }

    async fn handle_line(&self, line: &str) {
        match classify_line(line) {
            SseLine::Data(payload) => match serde_json::from_str::<Value>(payload) {
                Ok(bundle) => self.relay.publish_bundle(&bundle).await,
                Err(e) => warn!(error = %e, "Dropping undecodable event payload"),
            },
            SseLine::Comment(text) => trace!(text, "Stream keep-alive"),
            SseLine::Event(name) => debug!(name, "Stream event marker"),
            SseLine::Blank | SseLine::Other(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use rumqttc::{AsyncClient, MqttOptions};
    use tracing_test::traced_test;

    use super::*;

    fn test_source() -> (SseSource, rumqttc::EventLoop) {
        let options = MqttOptions::new("sse-test", "localhost", 1883);
        let (client, event_loop) = AsyncClient::new(options, 16);
        let relay = BundleRelay::new(client, "hue".to_string(), false);
        let config = BridgeConfig {
            app_key: "k".to_string(),
            ..BridgeConfig::default()
        };
        let source = SseSource::new(&config, relay, CancellationToken::new()).unwrap();
        (source, event_loop)
    }

    #[tokio::test]
    #[traced_test]
    async fn test_undecodable_data_line_is_dropped_with_warning() {
        let (source, _event_loop) = test_source();
        source.handle_line("data: not valid json").await;
        assert!(logs_contain("Dropping undecodable event payload"));
    }

    #[tokio::test]
    async fn test_keep_alive_and_blank_lines_produce_nothing() {
        let (source, _event_loop) = test_source();
        // Neither line may queue a publish or log above TRACE
        source.handle_line(": hi").await;
        source.handle_line("").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_hits_idle_timeout() {
        let mut stream = futures_util::stream::pending::<Result<Vec<u8>, std::io::Error>>();
        let start = tokio::time::Instant::now();

        let result = SseSource::next_with_idle_guard(&mut stream, Duration::from_secs(300)).await;

        assert!(matches!(result, Err(BridgeError::IdleTimeout(300))));
        assert_eq!(start.elapsed(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_stream_reports_stream_closed() {
        let mut stream = futures_util::stream::empty::<Result<Vec<u8>, std::io::Error>>();

        let result = SseSource::next_with_idle_guard(&mut stream, Duration::from_secs(300)).await;

        assert!(matches!(result, Err(BridgeError::StreamClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_before_idle_window_passes_through() {
        let mut stream =
            futures_util::stream::iter([Ok::<Vec<u8>, std::io::Error>(b"data: []\n".to_vec())]);

        let result = SseSource::next_with_idle_guard(&mut stream, Duration::from_secs(300)).await;

        assert_eq!(result.unwrap().unwrap(), b"data: []\n");
    }

    #[test]
    fn test_classify_data_with_space() {
        assert_eq!(classify_line("data: [{}]"), SseLine::Data("[{}]"));
    }

    #[test]
    fn test_classify_data_without_space() {
        assert_eq!(classify_line("data:[{}]"), SseLine::Data("[{}]"));
    }

    #[test]
    fn test_classify_keep_alive_comment() {
        assert_eq!(classify_line(": hi"), SseLine::Comment(" hi"));
    }

    #[test]
    fn test_classify_event_and_blank() {
        assert_eq!(classify_line("event: update"), SseLine::Event("update"));
        assert_eq!(classify_line(""), SseLine::Blank);
    }

    #[test]
    fn test_classify_unknown_field() {
        assert_eq!(classify_line("id: 42"), SseLine::Other("id: 42"));
    }

    #[test]
    fn test_line_buffer_drain_handles_partial_chunks() {
        // Same drain logic as stream_once: lines only surface once their
        // terminator arrives, carriage returns stripped.
        let chunks: [&[u8]; 3] = [b"data: [1,", b"2]\r\n: hi\n", b"data:"];
        let mut buffer: Vec<u8> = Vec::new();
        let mut lines = Vec::new();

        for chunk in chunks {
            buffer.extend_from_slice(chunk);
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw[..pos]).to_string();
                lines.push(line.trim_end_matches('\r').to_string());
            }
        }

        assert_eq!(lines, vec!["data: [1,2]", ": hi"]);
        assert_eq!(buffer, b"data:");
    }
}
