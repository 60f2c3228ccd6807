//! Payload normalization: raw broker frames to JSON-safe envelopes.
//!
//! Every frame delivered to the host passes through the same ordered
//! pipeline, and the pipeline never fails:
//!
//! 1. Payload bytes decode as UTF-8 with replacement characters, so binary
//!    garbage becomes a valid (if ugly) string instead of an error.
//! 2. The decoded text is parsed as JSON; if parsing fails the payload is
//!    carried as the plain text string.
//! 3. The parsed tree is JSON-safe by construction: `serde_json::Value`
//!    objects always have string keys and hold only JSON scalars, so no
//!    further coercion pass is needed once parsing has produced a tree.
//! 4. A final envelope check re-serializes `{topic, payload}`; if that ever
//!    fails, the envelope degrades to an all-string form rather than being
//!    dropped. A weird payload still reaches the host, just stringified.
//!
//! The topic side of the envelope is always a `String`, fixed at the decode
//! boundary. Consumers can rely on `envelope.topic` being printable and
//! comparable without unwrapping anything.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A normalized event: the topic it arrived on and its JSON-safe payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Topic the frame was published on. Always a plain string.
    pub topic: String,

    /// Normalized payload: parsed JSON when the bytes were JSON, otherwise
    /// a string.
    pub payload: Value,
}

impl Envelope {
    /// Builds an envelope and runs the final serializability check.
    ///
    /// If the `{topic, payload}` pair cannot be re-serialized, falls back to
    /// the all-string form instead of failing. Normalization has no error
    /// path.
    pub fn checked(topic: String, payload: Value) -> Envelope {
        let candidate = Envelope { topic, payload };
        match serde_json::to_vec(&candidate) {
            Ok(_) => candidate,
            Err(e) => {
                warn!("Envelope not serializable ({e}), degrading to string form");
                candidate.into_all_strings()
            }
        }
    }

    /// Degrades the envelope to `{topic: string, payload: string}`.
    ///
    /// The payload is rendered through its display form: JSON text for
    /// structured values, the bare string for string payloads.
    pub fn into_all_strings(self) -> Envelope {
        let payload = match self.payload {
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        };
        Envelope {
            topic: self.topic,
            payload,
        }
    }
}

/// Decodes payload bytes into a JSON value: parsed JSON when possible,
/// otherwise the lossily-decoded text.
///
/// Invalid UTF-8 sequences become U+FFFD replacement characters before the
/// parse attempt, so this function accepts any byte sequence.
pub fn decode_payload(bytes: &[u8]) -> Value {
    let text = String::from_utf8_lossy(bytes);
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => value,
        Err(_) => Value::String(text.into_owned()),
    }
}

/// Full pipeline: bytes plus topic in, checked envelope out.
pub fn normalize_frame(topic: &str, payload: &[u8]) -> Envelope {
    Envelope::checked(topic.to_string(), decode_payload(payload))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_json_payload_parses() {
        let value = decode_payload(br#"{"state":"ON","brightness":128}"#);
        assert_eq!(value, json!({"state": "ON", "brightness": 128}));
    }

    #[test]
    fn test_plain_text_payload_stays_text() {
        let value = decode_payload(b"hello world");
        assert_eq!(value, json!("hello world"));
    }

    #[test]
    fn test_truncated_json_falls_back_to_text() {
        let value = decode_payload(br#"{"state": "ON"#);
        assert_eq!(value, json!(r#"{"state": "ON"#));
    }

    #[test]
    fn test_invalid_utf8_becomes_replacement_chars() {
        let value = decode_payload(b"\xff\xfehello");
        assert_eq!(value, json!("\u{fffd}\u{fffd}hello"));
    }

    #[test]
    fn test_scalar_json_payloads() {
        assert_eq!(decode_payload(b"42"), json!(42));
        assert_eq!(decode_payload(b"true"), json!(true));
        assert_eq!(decode_payload(b"null"), json!(null));
        assert_eq!(decode_payload(br#""quoted""#), json!("quoted"));
    }

    #[test]
    fn test_empty_payload_is_empty_string() {
        assert_eq!(decode_payload(b""), json!(""));
    }

    #[test]
    fn test_normalize_frame_keeps_topic_as_string() {
        let envelope = normalize_frame("sensors/hall/motion", br#"{"occupancy":true}"#);
        assert_eq!(envelope.topic, "sensors/hall/motion");
        assert_eq!(envelope.payload, json!({"occupancy": true}));
    }

    #[test]
    fn test_checked_passes_ordinary_envelopes_through() {
        let envelope = Envelope::checked("a/b".into(), json!({"k": [1, 2, 3]}));
        assert_eq!(envelope.payload, json!({"k": [1, 2, 3]}));
    }

    #[test]
    fn test_all_strings_fallback() {
        let envelope = Envelope {
            topic: "a/b".into(),
            payload: json!({"nested": {"k": 1}}),
        };
        let degraded = envelope.into_all_strings();
        assert_eq!(degraded.topic, "a/b");
        assert_eq!(degraded.payload, json!(r#"{"nested":{"k":1}}"#));
    }

    #[test]
    fn test_all_strings_keeps_string_payloads_unquoted() {
        let envelope = Envelope {
            topic: "a/b".into(),
            payload: json!("already text"),
        };
        assert_eq!(envelope.into_all_strings().payload, json!("already text"));
    }

    #[test]
    fn test_envelope_serializes_to_expected_shape() {
        let envelope = normalize_frame("hall/light", br#"{"on":true}"#);
        let out = serde_json::to_value(&envelope).unwrap();
        assert_eq!(out, json!({"topic": "hall/light", "payload": {"on": true}}));
    }
}
