//! Broker payloads
//!
//! A payload whose first byte is `{` is a JSON object mapping message type
//! to parameters. Anything else is the compact `type,rest` form.
//!
//! Compact sequence grammar (codes `s` and `d`):
//!
//! ```text
//! rest   := [name ","] timestamp "," value
//! ```
//!
//! Fields are split on every comma, so none of them may contain one. Two
//! fields address the topic itself, three address `topic/name`.

use serde_json::{Map, Value};

use super::error::DecodeError;
use super::time::{parse_timestamp, Timestamp};

/// Batch of named values
pub const UPDATE_TYPE: &str = "update";
/// Key holding the batch timestamp inside an `update`
pub const BATCH_TIMESTAMP_KEY: &str = "$t";
/// Compact sample code
pub const SAMPLE_CODE: &str = "s";
/// Compact delta code
pub const DELTA_CODE: &str = "d";

/// A decoded broker payload
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerPayload {
    /// `{ "<type>": <params>, ... }`
    Json(Map<String, Value>),
    /// `<type>,<rest>`
    Compact { kind: String, rest: String },
}

impl BrokerPayload {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;

        if text.starts_with('{') {
            return match serde_json::from_str::<Value>(text)? {
                Value::Object(map) => Ok(BrokerPayload::Json(map)),
                other => Err(DecodeError::Shape(format!("expected object, got {}", other))),
            };
        }

        match text.split_once(',') {
            Some((kind, rest)) if !kind.is_empty() => Ok(BrokerPayload::Compact {
                kind: kind.to_string(),
                rest: rest.to_string(),
            }),
            _ => Err(DecodeError::Compact(text.to_string())),
        }
    }

    /// Logical `(type, params)` pairs carried by this payload.
    ///
    /// Compact payloads yield their raw `rest` as a string parameter.
    pub fn messages(&self) -> Vec<(String, Value)> {
        match self {
            BrokerPayload::Json(map) => map
                .iter()
                .map(|(kind, params)| (kind.clone(), params.clone()))
                .collect(),
            BrokerPayload::Compact { kind, rest } => {
                vec![(kind.clone(), Value::String(rest.clone()))]
            }
        }
    }
}

/// Encode an outbound broker payload: `{ "<type>": <params> }`
pub fn encode(kind: &str, params: &Value) -> String {
    let mut map = Map::new();
    map.insert(kind.to_string(), params.clone());
    Value::Object(map).to_string()
}

/// One value from a compact `s`/`d` payload
#[derive(Debug, Clone, PartialEq)]
pub struct CompactSample {
    /// Child name; `None` means the topic itself
    pub name: Option<String>,
    pub timestamp: Timestamp,
    pub value: Value,
}

impl CompactSample {
    /// Parse `rest` for a sequence code; `None` if it does not fit the grammar
    pub fn parse(rest: &str) -> Option<Self> {
        let fields: Vec<&str> = rest.split(',').collect();
        let (name, timestamp, value) = match fields.as_slice() {
            [timestamp, value] => (None, *timestamp, *value),
            [name, timestamp, value] if !name.is_empty() => {
                (Some(name.to_string()), *timestamp, *value)
            }
            _ => return None,
        };

        Some(Self {
            name,
            timestamp: parse_timestamp(timestamp)?,
            value: parse_scalar(value),
        })
    }
}

/// Is this a compact sequence code?
pub fn is_sequence_code(kind: &str) -> bool {
    kind == SAMPLE_CODE || kind == DELTA_CODE
}

/// Numbers and booleans keep their type; everything else stays a string
fn parse_scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_json() {
        let payload = BrokerPayload::decode(br#"{"update": {"$t": 1700000000, "x": 5}}"#).unwrap();
        let messages = payload.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "update");
        assert_eq!(messages[0].1["x"], json!(5));
    }

    #[test]
    fn test_decode_compact() {
        let payload = BrokerPayload::decode(b"s,1700000000,42").unwrap();
        assert_eq!(
            payload,
            BrokerPayload::Compact {
                kind: "s".to_string(),
                rest: "1700000000,42".to_string()
            }
        );
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(BrokerPayload::decode(b"nocomma"), Err(DecodeError::Compact(_))));
        assert!(matches!(BrokerPayload::decode(b",x"), Err(DecodeError::Compact(_))));
        assert!(matches!(BrokerPayload::decode(b""), Err(DecodeError::Compact(_))));
        assert!(matches!(BrokerPayload::decode(b"{oops"), Err(DecodeError::Json(_))));
        assert!(matches!(BrokerPayload::decode(&[0xff, 0xfe]), Err(DecodeError::Utf8(_))));
    }

    #[test]
    fn test_compact_sample_forms() {
        let sample = CompactSample::parse("1700000000,42").unwrap();
        assert_eq!(sample.name, None);
        assert_eq!(sample.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(sample.value, json!(42));

        let sample = CompactSample::parse("temp,2023-11-14T22:13:20Z,ok").unwrap();
        assert_eq!(sample.name.as_deref(), Some("temp"));
        assert_eq!(sample.value, json!("ok"));
    }

    #[test]
    fn test_compact_sample_rejects() {
        assert!(CompactSample::parse("42").is_none());
        assert!(CompactSample::parse("a,1700000000,1,2").is_none());
        assert!(CompactSample::parse(",1700000000,1").is_none());
        assert!(CompactSample::parse("later,1").is_none());
    }

    #[test]
    fn test_encode() {
        let text = encode("set_point", &json!({"value": 3}));
        assert_eq!(text, r#"{"set_point":{"value":3}}"#);
    }
}
