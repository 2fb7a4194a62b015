//! Per-transport connection state

use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::transport::{Transport, TransportKind};

/// Lifecycle of one transport's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Never asked to connect
    Idle,
    /// Open requested, waiting for the transport
    Connecting,
    /// Usable for sends
    Open,
    /// Lost or failed; a reconnect may be pending
    Closed,
}

impl LinkState {
    /// Can a connection attempt start from here?
    pub fn can_open(self) -> bool {
        matches!(self, LinkState::Idle | LinkState::Closed)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Idle => "idle",
            LinkState::Connecting => "connecting",
            LinkState::Open => "open",
            LinkState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A transport plus the session's view of it
pub(crate) struct Link {
    pub transport: Arc<dyn Transport>,
    pub state: LinkState,
    /// Incremented on every connection attempt; events from older attempts are stale
    pub epoch: u64,
    /// Pending reconnect timer
    pub reconnect: Option<JoinHandle<()>>,
}

impl Link {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: LinkState::Idle,
            epoch: 0,
            reconnect: None,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn cancel_reconnect(&mut self) {
        if let Some(handle) = self.reconnect.take() {
            handle.abort();
        }
    }
}
