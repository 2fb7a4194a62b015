//! Wire Formats
//!
//! Encoding and decoding for both transports.
//!
//! ## Legacy socket (JSON text frames)
//!
//! - Inbound: `{"type": "...", "timestamp": "...", "parameters": {...}}`
//! - Outbound: `{"type": "...", "parameters": {...}, "folder": "/a/b"}`
//! - Reserved outbound types: `connect`, `subscribe`, `ping`
//!
//! ## Broker payloads
//!
//! - JSON: `{"<type>": <params>}`; an `update` type carries
//!   `{"$t": <timestamp>, "<name>": <value>, ...}`
//! - Compact: `<type>,<rest>`; the `s` (sample) and `d` (delta) codes carry
//!   `[<name>,]<timestamp>,<value>` as `<rest>`

pub mod broker;
mod error;
pub mod legacy;
mod time;

pub use broker::{BrokerPayload, CompactSample};
pub use error::DecodeError;
pub use legacy::{InboundFrame, OutboundFrame};
pub use time::{parse_timestamp, timestamp_from_value, Timestamp};
