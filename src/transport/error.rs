//! Transport error types

use thiserror::Error;

use super::TransportKind;

/// Errors raised by a transport adapter
#[derive(Error, Debug)]
pub enum TransportError {
    /// No live connection to write to
    #[error("{0} transport is not connected")]
    NotConnected(TransportKind),

    /// The connection rejected the write
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The connection is alive but its request queue is full
    #[error("{0} transport is busy; unit dropped")]
    Busy(TransportKind),

    /// This transport cannot carry that kind of unit
    #[error("{0} transport does not support {1}")]
    Unsupported(TransportKind, &'static str),
}

impl TransportError {
    /// Does this error mean the connection itself is gone?
    pub fn is_connection_lost(&self) -> bool {
        !matches!(self, TransportError::Busy(_))
    }
}
