//! Message Router
//!
//! Fans decoded inbound messages out to three independent handler kinds:
//!
//! - **Type handlers**: at most one per message type, last registration wins
//! - **Generic handlers**: every inbound message, in registration order
//! - **Sequence handlers**: every value update, whichever wire form produced it
//!
//! Handler lists are independent of connection state; handlers registered
//! before a connection opens behave exactly like ones registered after.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::messages::broker::{self, BrokerPayload, CompactSample};
use crate::messages::{timestamp_from_value, DecodeError, InboundFrame, Timestamp};
use crate::topic::TopicPath;
use crate::transport::TransportKind;

/// Legacy message type reshaped into sequence events by the built-in relay
pub const SEQUENCE_UPDATE_TYPE: &str = "sequence_update";

pub type TypeHandler = Arc<dyn Fn(Option<Timestamp>, &Value) + Send + Sync>;
pub type GenericHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;
pub type SequenceHandler = Arc<dyn Fn(&SequenceEvent) + Send + Sync>;

/// One logical inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub source: TransportKind,
    /// Frame timestamp (legacy only)
    pub timestamp: Option<Timestamp>,
    /// Topic the message arrived on (broker only)
    pub topic: Option<TopicPath>,
    pub kind: String,
    pub params: Value,
}

/// A single timestamped value for one sequence
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceEvent {
    /// Absolute sequence path (leading slash)
    pub path: TopicPath,
    pub timestamp: Option<Timestamp>,
    pub value: Value,
}

#[derive(Default)]
struct HandlerTable {
    by_type: HashMap<String, TypeHandler>,
    generic: Vec<GenericHandler>,
    sequence: Vec<SequenceHandler>,
}

/// Dispatches inbound frames to registered handlers
#[derive(Default)]
pub struct MessageRouter {
    handlers: RwLock<HandlerTable>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the handler for one message type, replacing any previous one
    pub fn set_type_handler(
        &self,
        kind: impl Into<String>,
        handler: impl Fn(Option<Timestamp>, &Value) + Send + Sync + 'static,
    ) {
        let kind = kind.into();
        let mut handlers = self.handlers.write();
        if handlers.by_type.insert(kind.clone(), Arc::new(handler)).is_some() {
            tracing::debug!(kind = %kind, "Replaced type handler");
        }
    }

    pub fn add_generic_handler(&self, handler: impl Fn(&InboundMessage) + Send + Sync + 'static) {
        self.handlers.write().generic.push(Arc::new(handler));
    }

    pub fn add_sequence_handler(&self, handler: impl Fn(&SequenceEvent) + Send + Sync + 'static) {
        self.handlers.write().sequence.push(Arc::new(handler));
    }

    /// Install the `sequence_update` type handler that turns legacy
    /// `{name, timestamp?, value}` parameters into sequence events.
    pub fn install_sequence_relay(self: &Arc<Self>) {
        let router: Weak<Self> = Arc::downgrade(self);
        self.set_type_handler(SEQUENCE_UPDATE_TYPE, move |frame_timestamp, params| {
            let Some(router) = router.upgrade() else {
                return;
            };
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                tracing::debug!("sequence_update without a name ignored");
                return;
            };

            let timestamp = params
                .get("timestamp")
                .and_then(timestamp_from_value)
                .or(frame_timestamp);

            router.emit_sequence(&SequenceEvent {
                path: TopicPath::new(name),
                timestamp,
                value: params.get("value").cloned().unwrap_or(Value::Null),
            });
        });
    }

    /// Route one legacy text frame.
    ///
    /// The type handler (if any) runs first, then every generic handler.
    pub fn route_legacy(&self, text: &str) -> Result<(), DecodeError> {
        let frame = InboundFrame::decode(text)?;
        let timestamp = frame.timestamp();
        let InboundFrame {
            kind, parameters, ..
        } = frame;
        let Some(kind) = kind.filter(|k| !k.is_empty()) else {
            return Err(DecodeError::Shape("frame has no type".to_string()));
        };

        tracing::trace!(kind = %kind, "Routing legacy frame");

        let (type_handler, generic) = {
            let handlers = self.handlers.read();
            (handlers.by_type.get(&kind).cloned(), handlers.generic.clone())
        };

        if let Some(handler) = type_handler {
            handler(timestamp, &parameters);
        }

        if !generic.is_empty() {
            let message = InboundMessage {
                source: TransportKind::Legacy,
                timestamp,
                topic: None,
                kind,
                params: parameters,
            };
            for handler in &generic {
                handler(&message);
            }
        }

        Ok(())
    }

    /// Route one broker publish on a broker-native topic
    pub fn route_broker(&self, topic: &str, payload: &[u8]) -> Result<(), DecodeError> {
        let decoded = BrokerPayload::decode(payload)?;
        let path = TopicPath::from_broker(topic);

        tracing::trace!(topic = %path, "Routing broker payload");

        for (kind, params) in decoded.messages() {
            let events = sequence_events(&path, &decoded, &kind, &params);

            let message = InboundMessage {
                source: TransportKind::Broker,
                timestamp: None,
                topic: Some(path.clone()),
                kind,
                params,
            };
            self.emit_generic(&message);

            for event in &events {
                self.emit_sequence(event);
            }
        }

        Ok(())
    }

    /// Deliver a sequence event to every sequence handler
    pub fn emit_sequence(&self, event: &SequenceEvent) {
        let handlers = self.handlers.read().sequence.clone();
        for handler in &handlers {
            handler(event);
        }
    }

    fn emit_generic(&self, message: &InboundMessage) {
        let handlers = self.handlers.read().generic.clone();
        for handler in &handlers {
            handler(message);
        }
    }

    pub fn type_handler_count(&self) -> usize {
        self.handlers.read().by_type.len()
    }
}

/// Sequence events carried by one `(type, params)` pair of a broker payload
fn sequence_events(
    path: &TopicPath,
    payload: &BrokerPayload,
    kind: &str,
    params: &Value,
) -> Vec<SequenceEvent> {
    match payload {
        BrokerPayload::Json(_) if kind == broker::UPDATE_TYPE => {
            let Some(values) = params.as_object() else {
                return Vec::new();
            };
            let timestamp = values
                .get(broker::BATCH_TIMESTAMP_KEY)
                .and_then(timestamp_from_value);

            values
                .iter()
                .filter(|(name, _)| name.as_str() != broker::BATCH_TIMESTAMP_KEY)
                .map(|(name, value)| SequenceEvent {
                    path: path.child(name),
                    timestamp,
                    value: value.clone(),
                })
                .collect()
        }
        BrokerPayload::Compact { kind, rest } if broker::is_sequence_code(kind) => {
            match CompactSample::parse(rest) {
                Some(sample) => vec![SequenceEvent {
                    path: match &sample.name {
                        Some(name) => path.child(name),
                        None => path.clone(),
                    },
                    timestamp: Some(sample.timestamp),
                    value: sample.value,
                }],
                None => {
                    tracing::debug!(topic = %path, rest = %rest, "Compact sample does not fit grammar");
                    Vec::new()
                }
            }
        }
        _ => Vec::new(),
    }
}
