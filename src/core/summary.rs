//! One-line summaries of resource updates for the event log.
//!
//! A resource in an event bundle is an arbitrary JSON object; the summarizer
//! reduces it to a single human-readable line like `light/7: on=True` or
//! `motion/4e309b (Hallway sensor): motion=True`. Only a fixed allow-list of
//! fields is rendered, in a fixed order, so the log stays scannable no
//! matter what the bridge attaches to an update.

use serde_json::Value;

/// Fields worth surfacing in the event log, in display order.
const SUMMARY_FIELDS: [&str; 12] = [
    "on",
    "dimming",
    "brightness",
    "color_temperature",
    "temperature",
    "motion",
    "presence",
    "button",
    "contact",
    "tamper",
    "power_state",
    "battery_state",
];

/// Alternate inner keys for fields whose nested object does not repeat the
/// field name. Tried after the same-key rule; the first key present wins.
const UNWRAP_RULES: [(&str, &[&str]); 3] = [
    ("button", &["last_event", "event"]),
    ("dimming", &["brightness", "level"]),
    ("temperature", &["value"]),
];

/// Produces a one-line summary of a resource update.
///
/// The head is `{type}/{id}`, with `?` standing in for either when the
/// resource omits it, followed by the device name when
/// `metadata.name` is present. Fields outside the allow-list are
/// ignored; a resource with none of them summarizes as `{head} updated`.
pub fn summarize_resource(resource: &Value) -> String {
    let rtype = resource
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("?");
    let rid = resource.get("id").and_then(Value::as_str).unwrap_or("?");

    let mut head = format!("{rtype}/{rid}");
    if let Some(name) = resource
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
    {
        head = format!("{head} ({name})");
    }

    let mut parts = Vec::new();
    for field in SUMMARY_FIELDS {
        let Some(value) = resource.get(field) else {
            continue;
        };
        let Some(scalar) = extract_scalar(field, value) else {
            continue;
        };
        parts.push(format!("{}={}", display_label(field), render_scalar(scalar)));
    }

    if parts.is_empty() {
        format!("{head} updated")
    } else {
        format!("{head}: {}", parts.join(", "))
    }
}

/// Pulls the displayable scalar out of a field value.
///
/// Nested objects unwrap through the same-key rule first (`on: {"on": ..}`,
/// `motion: {"motion": ..}`), then through the field's alternate keys.
/// Anything that does not reduce to a scalar is skipped.
fn extract_scalar<'a>(field: &str, value: &'a Value) -> Option<&'a Value> {
    let candidate = match value {
        Value::Object(map) => {
            let mut inner = map.get(field);
            if inner.is_none() {
                if let Some((_, keys)) = UNWRAP_RULES.iter().find(|(f, _)| *f == field) {
                    inner = keys.iter().find_map(|key| map.get(*key));
                }
            }
            inner?
        }
        other => other,
    };

    match candidate {
        Value::Object(_) | Value::Array(_) => None,
        scalar => Some(scalar),
    }
}

/// Dimming values describe a brightness level; everything else keeps its
/// field name.
fn display_label(field: &str) -> &str {
    if field == "dimming" {
        "brightness"
    } else {
        field
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_light_power_toggle() {
        let resource = json!({
            "type": "light",
            "id": "7",
            "on": {"on": true}
        });
        assert_eq!(summarize_resource(&resource), "light/7: on=True");
    }

    #[test]
    fn test_named_resource_with_multiple_fields() {
        let resource = json!({
            "type": "light",
            "id": "a1",
            "metadata": {"name": "Kitchen spot"},
            "on": {"on": false},
            "dimming": {"brightness": 62.5}
        });
        assert_eq!(
            summarize_resource(&resource),
            "light/a1 (Kitchen spot): on=False, brightness=62.5"
        );
    }

    #[test]
    fn test_dimming_renders_under_brightness_label() {
        let resource = json!({
            "type": "light",
            "id": "d1",
            "dimming": {"brightness": 40}
        });
        assert_eq!(summarize_resource(&resource), "light/d1: brightness=40");
    }

    #[test]
    fn test_button_press_unwraps_last_event() {
        let resource = json!({
            "type": "button",
            "id": "b2",
            "button": {"last_event": "short_release"}
        });
        assert_eq!(
            summarize_resource(&resource),
            "button/b2: button=short_release"
        );
    }

    #[test]
    fn test_alternate_key_unwrap_when_same_key_is_absent() {
        let resource = json!({
            "type": "temperature",
            "id": "t1",
            "temperature": {"value": 21.45}
        });
        assert_eq!(
            summarize_resource(&resource),
            "temperature/t1: temperature=21.45"
        );
    }

    #[test]
    fn test_scalar_fields_render_directly() {
        let resource = json!({
            "type": "device_power",
            "id": "p1",
            "battery_state": "normal"
        });
        assert_eq!(
            summarize_resource(&resource),
            "device_power/p1: battery_state=normal"
        );
    }

    #[test]
    fn test_same_key_unwrap_applies_to_every_field() {
        let resource = json!({
            "type": "sensor",
            "id": "s2",
            "motion": {"motion": true},
            "presence": {"presence": false},
            "contact": {"contact": "no_contact"}
        });
        assert_eq!(
            summarize_resource(&resource),
            "sensor/s2: motion=True, presence=False, contact=no_contact"
        );
    }

    #[test]
    fn test_unrecognized_nested_shape_is_skipped() {
        let resource = json!({
            "type": "device_power",
            "id": "p2",
            "power_state": {"battery_level": 88}
        });
        // No same-key or alternate match and no scalar: field dropped,
        // generic marker remains
        assert_eq!(summarize_resource(&resource), "device_power/p2 updated");
    }

    #[test]
    fn test_fields_render_in_fixed_order() {
        let resource = json!({
            "type": "sensor",
            "id": "s1",
            "motion": {"motion": true},
            "on": {"on": true}
        });
        // "on" before "motion" regardless of object key order.
        assert_eq!(summarize_resource(&resource), "sensor/s1: on=True, motion=True");
    }

    #[test]
    fn test_no_summary_fields_falls_back_to_updated() {
        let resource = json!({
            "type": "zigbee_connectivity",
            "id": "z9",
            "status": "connected"
        });
        assert_eq!(summarize_resource(&resource), "zigbee_connectivity/z9 updated");
    }

    #[test]
    fn test_missing_type_and_id_use_placeholders() {
        let resource = json!({"on": {"on": true}});
        assert_eq!(summarize_resource(&resource), "?/?: on=True");
    }
}
