//! Legacy WebSocket transport
//!
//! Each connection attempt runs in its own task: connect, report `Opened`,
//! then pump outbound frames from a channel and inbound frames to the sink
//! until either side ends.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{EventSink, Inbound, Outbound, Transport, TransportError, TransportEvent, TransportKind};

/// WebSocket connection to the legacy message endpoint
pub struct LegacyTransport {
    url: String,
    link: Mutex<Option<Link>>,
}

struct Link {
    outbound: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

impl LegacyTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            link: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for LegacyTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Legacy
    }

    fn open(&self, sink: EventSink) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(self.url.clone(), rx, sink));

        if let Some(previous) = self.link.lock().replace(Link { outbound: tx, task }) {
            previous.task.abort();
        }
    }

    fn send(&self, frame: Outbound) -> Result<(), TransportError> {
        let text = match frame {
            Outbound::Text(text) => text,
            Outbound::Subscribe { .. } | Outbound::SubscribeMany { .. } | Outbound::Publish { .. } => {
                return Err(TransportError::Unsupported(self.kind(), "broker units"))
            }
        };

        let link = self.link.lock();
        let link = link.as_ref().ok_or(TransportError::NotConnected(self.kind()))?;
        link.outbound
            .send(Message::text(text))
            .map_err(|_| TransportError::NotConnected(self.kind()))
    }

    async fn close(&self) {
        if let Some(link) = self.link.lock().take() {
            link.task.abort();
        }
    }
}

impl Drop for LegacyTransport {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.task.abort();
        }
    }
}

async fn run_connection(url: String, mut outbound: mpsc::UnboundedReceiver<Message>, sink: EventSink) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "WebSocket connect failed");
            sink.emit(TransportEvent::Closed {
                reason: Some(e.to_string()),
            });
            return;
        }
    };

    tracing::debug!(url = %url, epoch = sink.epoch(), "WebSocket connected");
    sink.emit(TransportEvent::Opened);

    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        break Some(e.to_string());
                    }
                }
                None => {
                    let _ = write.close().await;
                    break None;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    sink.emit(TransportEvent::Received(Inbound::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Close(_))) | None => break None,
                // Pong is handled by tungstenite; binary frames are not part of the protocol
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
            },
        }
    };

    tracing::debug!(url = %url, reason = ?reason, "WebSocket closed");
    sink.emit(TransportEvent::Closed { reason });
}
