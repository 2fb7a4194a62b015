//! Legacy socket frames

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::DecodeError;
use super::time::{timestamp_from_value, Timestamp};
use crate::registry::Subscription;
use crate::topic::TopicPath;

/// Announcement sent once per open
pub const CONNECT_TYPE: &str = "connect";
/// Carries the full subscription list
pub const SUBSCRIBE_TYPE: &str = "subscribe";
/// Keepalive no-op
pub const PING_TYPE: &str = "ping";

/// A frame received over the legacy socket
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    /// Message type; frames without one are ignored by the router
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// ISO-8601 or epoch timestamp
    #[serde(default)]
    pub timestamp: Option<Value>,

    #[serde(default)]
    pub parameters: Value,
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp.as_ref().and_then(timestamp_from_value)
    }
}

/// A frame sent over the legacy socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    pub kind: String,

    pub parameters: Value,

    /// Destination folder; omitted for control frames with no target
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub folder: Option<TopicPath>,
}

impl OutboundFrame {
    pub fn new(kind: impl Into<String>, parameters: Value, folder: Option<TopicPath>) -> Self {
        Self {
            kind: kind.into(),
            parameters,
            folder,
        }
    }

    /// `connect` announcement
    pub fn connect(folder: Option<TopicPath>) -> Self {
        Self::new(CONNECT_TYPE, empty_params(), folder)
    }

    /// `subscribe` carrying the given subscriptions
    pub fn subscribe(subscriptions: &[Subscription], folder: Option<TopicPath>) -> Self {
        let parameters = serde_json::json!({ "subscriptions": subscriptions });
        Self::new(SUBSCRIBE_TYPE, parameters, folder)
    }

    /// Keepalive `ping`
    pub fn ping(folder: Option<TopicPath>) -> Self {
        Self::new(PING_TYPE, empty_params(), folder)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub(crate) fn empty_params() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_decode() {
        let frame = InboundFrame::decode(
            r#"{"type": "sequence_update", "timestamp": "2023-11-14T22:13:20Z", "parameters": {"name": "/a/x", "value": 3}}"#,
        )
        .unwrap();
        assert_eq!(frame.kind.as_deref(), Some("sequence_update"));
        assert_eq!(frame.timestamp().unwrap().timestamp(), 1_700_000_000);
        assert_eq!(frame.parameters["value"], json!(3));
    }

    #[test]
    fn test_inbound_missing_fields() {
        let frame = InboundFrame::decode(r#"{"parameters": {}}"#).unwrap();
        assert!(frame.kind.is_none());
        assert!(frame.timestamp().is_none());

        assert!(InboundFrame::decode("not json").is_err());
    }

    #[test]
    fn test_outbound_shape() {
        let frame = OutboundFrame::new("set", json!({"x": 1}), Some(TopicPath::new("/lab")));
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "set", "parameters": {"x": 1}, "folder": "/lab"}));
    }

    #[test]
    fn test_control_frames() {
        let ping: Value = serde_json::from_str(&OutboundFrame::ping(None).encode().unwrap()).unwrap();
        assert_eq!(ping, json!({"type": "ping", "parameters": {}}));

        let subs = vec![Subscription::new("/a"), Subscription::new("/b").include_self(true)];
        let frame = OutboundFrame::subscribe(&subs, None);
        assert_eq!(
            frame.parameters,
            json!({"subscriptions": [{"folder": "/a"}, {"folder": "/b", "include_self": true}]})
        );
    }
}
