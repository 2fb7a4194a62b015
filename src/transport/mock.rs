//! In-memory transport for session tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

use super::{EventSink, Outbound, Transport, TransportError, TransportEvent, TransportKind};

/// Runs after a unit is recorded, outside the mock's lock
pub(crate) type SendHook = Arc<dyn Fn(&Outbound) + Send + Sync>;

pub(crate) struct MockTransport {
    kind: TransportKind,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    sink: Option<EventSink>,
    opens: usize,
    sent: Vec<Outbound>,
    fail_sends: bool,
    busy: bool,
    closed: bool,
    on_send: Option<SendHook>,
}

impl MockTransport {
    pub(crate) fn new(kind: TransportKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            state: Mutex::new(MockState::default()),
        })
    }

    /// Inject an event on the latest connection attempt
    pub(crate) fn emit(&self, event: TransportEvent) {
        let sink = self.state.lock().sink.clone();
        sink.expect("transport was never opened").emit(event);
    }

    /// Inject an event on a specific (possibly stale) attempt
    pub(crate) fn sink(&self) -> EventSink {
        self.state.lock().sink.clone().expect("transport was never opened")
    }

    pub(crate) fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Reject sends as a full queue on a live connection
    pub(crate) fn busy(&self, busy: bool) {
        self.state.lock().busy = busy;
    }

    pub(crate) fn on_send(&self, hook: impl Fn(&Outbound) + Send + Sync + 'static) {
        self.state.lock().on_send = Some(Arc::new(hook));
    }

    pub(crate) fn take_sent(&self) -> Vec<Outbound> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Sent legacy frames, decoded as JSON
    pub(crate) fn take_frames(&self) -> Vec<Value> {
        self.take_sent()
            .into_iter()
            .filter_map(|unit| match unit {
                Outbound::Text(text) => serde_json::from_str(&text).ok(),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn open(&self, sink: EventSink) {
        let mut state = self.state.lock();
        state.opens += 1;
        state.sink = Some(sink);
    }

    fn send(&self, frame: Outbound) -> Result<(), TransportError> {
        let hook = {
            let mut state = self.state.lock();
            if state.fail_sends {
                return Err(TransportError::SendFailed("socket torn down".to_string()));
            }
            if state.busy {
                return Err(TransportError::Busy(self.kind));
            }
            state.sent.push(frame.clone());
            state.on_send.clone()
        };
        if let Some(hook) = hook {
            hook(&frame);
        }
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().closed = true;
    }
}
