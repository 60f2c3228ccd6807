//! Republishing event bundles to MQTT.
//!
//! Every bundle from the event stream fans out twice: the raw bundle JSON
//! goes to `{prefix}/raw`, and each resource inside it goes to
//! `{prefix}/{type}/{id}`, with `unknown` standing in for a missing type or
//! id. Publishes are fire-and-forget; a failed publish is logged and never
//! tears down the stream.

use rumqttc::{AsyncClient, QoS};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::summary::summarize_resource;

/// Fans event bundles out to the MQTT broker.
pub struct BundleRelay {
    client: AsyncClient,
    prefix: String,
    event_log: bool,
}

impl BundleRelay {
    pub fn new(client: AsyncClient, prefix: String, event_log: bool) -> Self {
        BundleRelay {
            client,
            prefix,
            event_log,
        }
    }

    /// Publishes a decoded bundle: the raw JSON first, then each resource.
    ///
    /// A bundle is an array of events; each event carries a `data` array of
    /// resource updates. Events without one are skipped.
    pub async fn publish_bundle(&self, bundle: &Value) {
        self.publish(&format!("{}/raw", self.prefix), bundle.to_string())
            .await;

        let Some(events) = bundle.as_array() else {
            debug!("Bundle is not an array, raw publish only");
            return;
        };

        for event in events {
            let Some(resources) = event.get("data").and_then(Value::as_array) else {
                continue;
            };
            for resource in resources {
                self.publish_resource(resource).await;
            }
        }
    }

    /// Publishes a single resource update to its per-resource topic.
    ///
    /// Resources missing `type` or `id` still go out, filed under `unknown`
    /// for the missing part; every update reaches the broker.
    async fn publish_resource(&self, resource: &Value) {
        let (rtype, rid) = resource_identity(resource);
        if rtype == "unknown" || rid == "unknown" {
            debug!("Resource missing type or id, publishing under unknown");
        }

        if self.event_log {
            info!("{}", summarize_resource(resource));
        }

        let topic = resource_topic(&self.prefix, rtype, rid);
        self.publish(&topic, resource.to_string()).await;
    }

    async fn publish(&self, topic: &str, payload: String) {
        if let Err(e) = self
            .client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
        {
            warn!(topic, error = %e, "Failed to queue MQTT publish");
        }
    }
}

/// Topic a resource update lands on.
fn resource_topic(prefix: &str, rtype: &str, rid: &str) -> String {
    format!("{prefix}/{rtype}/{rid}")
}

/// Extracts the resource's type and id, defaulting missing or non-string
/// fields to `unknown`.
fn resource_identity(resource: &Value) -> (&str, &str) {
    (
        resource.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        resource.get("id").and_then(Value::as_str).unwrap_or("unknown"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::MqttOptions;
    use serde_json::json;
    use tracing_test::traced_test;

    fn test_relay(event_log: bool) -> (BundleRelay, rumqttc::EventLoop) {
        let options = MqttOptions::new("relay-test", "localhost", 1883);
        let (client, event_loop) = AsyncClient::new(options, 16);
        (
            BundleRelay::new(client, "hue".to_string(), event_log),
            event_loop,
        )
    }

    #[test]
    fn test_resource_topic_shape() {
        assert_eq!(resource_topic("hue", "light", "7"), "hue/light/7");
        assert_eq!(
            resource_topic("home/hue", "motion", "abc"),
            "home/hue/motion/abc"
        );
    }

    #[tokio::test]
    async fn test_publish_bundle_queues_without_broker() {
        let (relay, _event_loop) = test_relay(false);
        let bundle = json!([
            {"type": "update", "data": [
                {"type": "light", "id": "7", "on": {"on": true}}
            ]}
        ]);
        // The request channel accepts the publishes even though no broker is
        // reachable; failure surfaces in the connection task, not here.
        relay.publish_bundle(&bundle).await;
    }

    #[test]
    fn test_missing_identity_defaults_to_unknown() {
        assert_eq!(
            resource_identity(&json!({"on": {"on": true}})),
            ("unknown", "unknown")
        );
        assert_eq!(resource_identity(&json!({"type": "light"})), ("light", "unknown"));
        assert_eq!(
            resource_identity(&json!({"type": "light", "id": "7"})),
            ("light", "7")
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_resources_without_identity_still_publish() {
        let (relay, _event_loop) = test_relay(true);
        let bundle = json!([
            {"type": "update", "data": [
                {"on": {"on": true}}
            ]}
        ]);
        relay.publish_bundle(&bundle).await;
        // The update is forwarded, not dropped: it gets a summary line and
        // lands under the unknown topic
        assert!(logs_contain("Resource missing type or id"));
        assert!(logs_contain("?/?: on=True"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_event_log_emits_summary_line() {
        let (relay, _event_loop) = test_relay(true);
        let bundle = json!([
            {"type": "update", "data": [
                {"type": "light", "id": "7", "on": {"on": true}}
            ]}
        ]);
        relay.publish_bundle(&bundle).await;
        assert!(logs_contain("light/7: on=True"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_non_array_bundle_publishes_raw_only() {
        let (relay, _event_loop) = test_relay(true);
        relay.publish_bundle(&json!({"not": "an array"})).await;
        assert!(logs_contain("Bundle is not an array"));
    }
}
