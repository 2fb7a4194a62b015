//! Reconnect notice
//!
//! The UI collaborator shows a single "reconnecting" notice while a
//! transport is down and hides it once every transport is open again.

/// Receives show/dismiss requests for the reconnect notice
pub trait ConnectionNotice: Send + Sync {
    fn show(&self);
    fn dismiss(&self);
}

/// Notice that only logs; used when no UI is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotice;

impl ConnectionNotice for LogNotice {
    fn show(&self) {
        tracing::warn!("Reconnecting to server...");
    }

    fn dismiss(&self) {
        tracing::info!("Connection restored");
    }
}
