//! Outbound Composer
//!
//! Builds the per-transport unit for one outbound message. Sends are
//! fire-and-forget: nothing is queued while a transport is down.

use serde_json::Value;

use crate::messages::{broker, OutboundFrame};
use crate::topic::TopicPath;
use crate::transport::Outbound;

/// Explicit target if given, otherwise the default target
pub fn resolve_destination(
    explicit: Option<&str>,
    default_target: Option<&TopicPath>,
) -> Option<TopicPath> {
    explicit.map(TopicPath::new).or_else(|| default_target.cloned())
}

/// `{"type", "parameters", "folder"}` text frame for the legacy socket
pub fn legacy_unit(
    kind: &str,
    params: &Value,
    folder: Option<TopicPath>,
) -> Result<Outbound, serde_json::Error> {
    let frame = OutboundFrame::new(kind, params.clone(), folder);
    Ok(Outbound::Text(frame.encode()?))
}

/// `{ "<type>": params }` published on the broker-native destination topic
pub fn broker_unit(kind: &str, params: &Value, destination: &TopicPath) -> Outbound {
    Outbound::Publish {
        topic: destination.to_broker().to_string(),
        payload: broker::encode(kind, params),
    }
}
