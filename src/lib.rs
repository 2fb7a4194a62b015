//! # Dashlink
//!
//! Messaging core for a live-telemetry dashboard client. Dashboard widgets
//! subscribe to hierarchical folder paths, receive live values and control
//! messages, and send commands back, over a legacy WebSocket, an MQTT broker,
//! or both at once.
//!
//! ## Features
//!
//! - **Subscriptions**: deduplicated, replayed in full on every (re)connect
//! - **Routing**: per-type, generic and sequence-value handlers across both wire forms
//! - **Reconnection**: fixed-delay retry, keepalive pings and a reconnect notice
//! - **Fire-and-forget sends**: to an explicit folder or the default target
//!
//! ## Modules
//!
//! - [`session`]: The reconnecting session and outbound composer
//! - [`router`]: Inbound message dispatch
//! - [`registry`]: Subscription set and default target
//! - [`transport`]: Legacy WebSocket and MQTT broker adapters
//! - [`messages`]: Wire formats for both transports
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dashlink::config::Config;
//! use dashlink::session::Session;
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = Session::from_config(&Config::load_default());
//!
//!     session.add_sequence_handler(|event| {
//!         println!("{} = {}", event.path, event.value);
//!     });
//!     session.subscribe("/building/sensor3");
//!     session.connect();
//!
//!     // Goes to the default target (the first subscription)
//!     session.send("set_point", Some(serde_json::json!({"value": 21.5})), None);
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     session.close().await;
//! }
//! ```

pub mod config;
pub mod messages;
pub mod registry;
pub mod router;
pub mod session;
pub mod topic;
pub mod transport;

pub use config::Config;
pub use registry::Subscription;
pub use router::{InboundMessage, MessageRouter, SequenceEvent};
pub use session::{ConnectionNotice, LinkState, Session, SessionBuilder, SessionSettings};
pub use topic::TopicPath;
pub use transport::TransportKind;
