//! Transport Adapters
//!
//! Two wire transports sit behind one interface:
//!
//! - **Legacy**: a bidirectional WebSocket carrying JSON text frames
//! - **Broker**: an MQTT publish/subscribe connection
//!
//! Adapters never call back into the session directly. Every lifecycle
//! change and inbound frame is reported as a [`TransportEvent`] through the
//! [`EventSink`] handed to [`Transport::open`], so the session consumes all
//! transports from one ordered queue.

mod broker;
mod error;
mod legacy;
#[cfg(test)]
pub(crate) mod mock;

pub use broker::BrokerTransport;
pub use error::TransportError;
pub use legacy::LegacyTransport;

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// Which wire protocol a transport speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Legacy,
    Broker,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Legacy => f.write_str("legacy"),
            TransportKind::Broker => f.write_str("broker"),
        }
    }
}

/// Raw inbound unit, before decoding
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Legacy text frame
    Text(String),
    /// Broker publish on a broker-native topic
    Publish { topic: String, payload: Vec<u8> },
}

/// Raw outbound unit
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Legacy text frame
    Text(String),
    /// Broker topic subscription (broker-native topic)
    Subscribe { topic: String },
    /// Several broker topic subscriptions in one request
    SubscribeMany { topics: Vec<String> },
    /// Broker publish (broker-native topic)
    Publish { topic: String, payload: String },
}

/// Lifecycle and data events reported by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection is usable
    Opened,
    /// A frame arrived
    Received(Inbound),
    /// An open connection was lost or closed
    Closed { reason: Option<String> },
    /// The connection attempt was rejected before opening
    ConnectFailed { reason: String },
}

/// An event tagged with its origin and connection attempt
#[derive(Debug, Clone)]
pub struct Envelope {
    pub kind: TransportKind,
    /// Connection attempt this event belongs to
    pub epoch: u64,
    pub event: TransportEvent,
}

/// Where a transport reports events for one connection attempt
#[derive(Debug, Clone)]
pub struct EventSink {
    kind: TransportKind,
    epoch: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSink {
    pub fn new(kind: TransportKind, epoch: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { kind, epoch, tx }
    }

    /// Report an event; returns false once the session is gone
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Envelope {
                kind: self.kind,
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// A wire transport
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Start a connection attempt.
    ///
    /// Must not block; the outcome is reported through `sink`. Opening again
    /// replaces any previous connection.
    fn open(&self, sink: EventSink);

    /// Hand a unit to the live connection
    fn send(&self, frame: Outbound) -> Result<(), TransportError>;

    /// Tear down the connection, if any
    async fn close(&self);
}
