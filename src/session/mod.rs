//! Messaging Session
//!
//! A long-lived, reconnecting client over one or both transports.
//!
//! ## Architecture
//!
//! - **Links**: one per configured transport, each with its own
//!   `Idle → Connecting → Open → Closed` state
//! - **Pump**: a single task consuming every transport event in delivery
//!   order, so routing and state transitions never interleave
//! - **Timers**: reconnect delay, keepalive interval and notice grace delay,
//!   all owned by the session and cancelled by [`Session::close`]
//!
//! Subscriptions and handlers are not owned by any transport. Every open
//! replays the full subscription set, so reconnecting needs no resync
//! bookkeeping.
//!
//! ## Failure policy
//!
//! Nothing here returns an error to the caller. Sends while no transport is
//! open are dropped, a failed write is treated like a lost connection, and
//! malformed inbound payloads are logged and skipped.

pub mod composer;
mod notice;
mod state;

pub use notice::{ConnectionNotice, LogNotice};
pub use state::LinkState;

use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;
use std::cell::Cell;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{Config, SessionConfig};
use crate::messages::legacy::empty_params;
use crate::messages::{OutboundFrame, Timestamp};
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::router::{InboundMessage, MessageRouter, SequenceEvent};
use crate::topic::TopicPath;
use crate::transport::{
    BrokerTransport, Envelope, EventSink, Inbound, LegacyTransport, Outbound, Transport,
    TransportEvent, TransportKind,
};
use state::Link;

/// Callback run after the primary transport opens (again on every reconnect)
pub type AfterOpen = Arc<dyn Fn() + Send + Sync>;

/// Session timing and behavior
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Delay before reconnecting after a loss or failed send
    pub reconnect_delay: Duration,
    /// Interval between keepalive pings on the legacy transport
    pub keepalive_interval: Duration,
    /// Delay before dismissing the reconnect notice after an open
    pub notice_grace: Duration,
    /// Install the built-in `sequence_update` relay
    pub relay_sequence_updates: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            keepalive_interval: config.keepalive_interval(),
            notice_grace: config.notice_grace(),
            relay_sequence_updates: config.relay_sequence_updates,
        }
    }
}

/// Builds a [`Session`] from settings, transports and a notice
pub struct SessionBuilder {
    settings: SessionSettings,
    transports: Vec<Arc<dyn Transport>>,
    notice: Arc<dyn ConnectionNotice>,
}

impl SessionBuilder {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            transports: Vec::new(),
            notice: Arc::new(LogNotice),
        }
    }

    /// Add a transport; a second transport of the same kind replaces the first
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        let kind = transport.kind();
        if let Some(pos) = self.transports.iter().position(|t| t.kind() == kind) {
            tracing::debug!(transport = %kind, "Replacing transport");
            self.transports.remove(pos);
        }
        self.transports.push(transport);
        self
    }

    /// UI collaborator for the reconnect notice
    pub fn notice(mut self, notice: Arc<dyn ConnectionNotice>) -> Self {
        self.notice = notice;
        self
    }

    pub fn build(self) -> Session {
        if self.transports.is_empty() {
            tracing::warn!("Session has no transports; sends will be dropped");
        }

        let (events, receiver) = mpsc::unbounded_channel();
        let router = Arc::new(MessageRouter::new());
        if self.settings.relay_sequence_updates {
            router.install_sequence_relay();
        }

        let links = self.transports.into_iter().map(Link::new).collect();

        Session {
            shared: Arc::new(Shared {
                settings: self.settings,
                registry: Mutex::new(SubscriptionRegistry::new()),
                router,
                links: Mutex::new(Links { entries: links }),
                events,
                receiver: Mutex::new(Some(receiver)),
                timers: Mutex::new(Vec::new()),
                after_open: Mutex::new(None),
                notice: self.notice,
                notice_shown: ReentrantMutex::new(Cell::new(false)),
                keepalive_started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

/// Handle to a messaging session; clones share the same session
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

struct Shared {
    settings: SessionSettings,
    registry: Mutex<SubscriptionRegistry>,
    router: Arc<MessageRouter>,
    links: Mutex<Links>,
    events: mpsc::UnboundedSender<Envelope>,
    /// Taken by the pump on first connect
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    /// Pump, keepalive and grace-delay tasks
    timers: Mutex<Vec<JoinHandle<()>>>,
    after_open: Mutex<Option<AfterOpen>>,
    notice: Arc<dyn ConnectionNotice>,
    /// Held across `show`/`dismiss` so the two never cross; reentrant so a
    /// notice may call back into the session
    notice_shown: ReentrantMutex<Cell<bool>>,
    keepalive_started: AtomicBool,
    closed: AtomicBool,
}

/// One link per configured transport
struct Links {
    entries: Vec<Link>,
}

impl Links {
    fn get(&self, kind: TransportKind) -> Option<&Link> {
        self.entries.iter().find(|l| l.kind() == kind)
    }

    fn get_mut(&mut self, kind: TransportKind) -> Option<&mut Link> {
        self.entries.iter_mut().find(|l| l.kind() == kind)
    }

    fn all_open(&self) -> bool {
        self.entries.iter().all(|l| l.state == LinkState::Open)
    }
}

impl Session {
    pub fn builder(settings: SessionSettings) -> SessionBuilder {
        SessionBuilder::new(settings)
    }

    /// Session with the transports enabled in `config`
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::builder(SessionSettings::from(&config.session));
        if config.legacy.enabled {
            builder = builder.transport(Arc::new(LegacyTransport::new(&config.legacy.url)));
        }
        if config.broker.enabled {
            builder = builder.transport(Arc::new(BrokerTransport::new(config.broker.clone())));
        }
        builder.build()
    }

    /// Open every configured transport.
    ///
    /// Transports that are already connecting or open are left alone, so
    /// repeated calls are harmless. Must be called within a tokio runtime.
    pub fn connect(&self) {
        self.shared.start();
        self.shared.open_links();
    }

    /// Like [`connect`](Self::connect), also setting the after-open callback
    pub fn connect_with(&self, after_open: impl Fn() + Send + Sync + 'static) {
        *self.shared.after_open.lock() = Some(Arc::new(after_open));
        self.connect();
    }

    /// Subscribe to messages from a folder
    pub fn subscribe(&self, topic: impl Into<TopicPath>) -> bool {
        self.subscribe_with(Subscription::new(topic))
    }

    /// Subscribe with explicit flags.
    ///
    /// Returns `false` if the topic was already subscribed. New
    /// subscriptions are also sent right away on every open transport.
    pub fn subscribe_with(&self, subscription: Subscription) -> bool {
        tracing::debug!(topic = %subscription.topic, "Subscribe");
        let (open, default_target) = {
            let mut registry = self.shared.registry.lock();
            if !registry.subscribe(subscription.clone()) {
                return false;
            }
            // Links opening now replay the registry; only already-open ones need this one
            (self.shared.open_kinds(), registry.default_target().cloned())
        };
        self.shared.announce(&subscription, &open, default_target);
        true
    }

    /// Bind the handler for one message type (last registration wins)
    pub fn add_type_handler(
        &self,
        kind: impl Into<String>,
        handler: impl Fn(Option<Timestamp>, &Value) + Send + Sync + 'static,
    ) {
        self.shared.router.set_type_handler(kind, handler);
    }

    /// Handler for every inbound message from either transport
    pub fn add_generic_handler(&self, handler: impl Fn(&InboundMessage) + Send + Sync + 'static) {
        self.shared.router.add_generic_handler(handler);
    }

    /// Handler for every sequence value update
    pub fn add_sequence_handler(&self, handler: impl Fn(&SequenceEvent) + Send + Sync + 'static) {
        self.shared.router.add_sequence_handler(handler);
    }

    /// Send a message to `target`, or to the default target.
    ///
    /// Goes out over every open transport. Dropped (not queued) when there is
    /// no destination or no open transport. Returns the number of transports
    /// that accepted it.
    pub fn send(&self, kind: &str, params: Option<Value>, target: Option<&str>) -> usize {
        let shared = &self.shared;
        let params = params.unwrap_or_else(empty_params);

        let destination = {
            let registry = shared.registry.lock();
            composer::resolve_destination(target, registry.default_target())
        };
        let Some(destination) = destination else {
            tracing::debug!(kind = %kind, "No destination; send dropped");
            return 0;
        };

        let mut delivered = 0;
        for link_kind in shared.open_kinds() {
            let unit = match link_kind {
                TransportKind::Legacy => {
                    match composer::legacy_unit(kind, &params, Some(destination.clone())) {
                        Ok(unit) => unit,
                        Err(e) => {
                            tracing::warn!(kind = %kind, error = %e, "Failed to encode frame");
                            continue;
                        }
                    }
                }
                TransportKind::Broker => composer::broker_unit(kind, &params, &destination),
            };
            if shared.transmit(link_kind, unit) {
                delivered += 1;
            }
        }

        if delivered == 0 {
            tracing::debug!(kind = %kind, destination = %destination, "No open transport; send dropped");
        }
        delivered
    }

    /// Replace the default target for sends without an explicit destination
    pub fn set_default_target(&self, topic: impl Into<TopicPath>) {
        self.shared.registry.lock().set_default_target(topic.into());
    }

    pub fn default_target(&self) -> Option<TopicPath> {
        self.shared.registry.lock().default_target().cloned()
    }

    /// Current subscription set, in subscription order
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.shared.registry.lock().current_set().to_vec()
    }

    /// State of one transport, if configured
    pub fn link_state(&self, kind: TransportKind) -> Option<LinkState> {
        self.shared.links.lock().get(kind).map(|l| l.state)
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.shared.router
    }

    /// Stop all timers and close every transport.
    ///
    /// After this the session stays closed: `connect` and `send` do nothing.
    pub async fn close(&self) {
        let shared = &self.shared;
        if shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let transports: Vec<Arc<dyn Transport>> = {
            let mut links = shared.links.lock();
            for link in links.entries.iter_mut() {
                link.cancel_reconnect();
                link.state = LinkState::Closed;
            }
            links.entries.iter().map(|l| Arc::clone(&l.transport)).collect()
        };

        for timer in shared.timers.lock().drain(..) {
            timer.abort();
        }

        for transport in transports {
            transport.close().await;
        }

        tracing::info!("Session closed");
    }
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Start the event pump (first call only)
    fn start(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }
        let Some(mut receiver) = self.receiver.lock().take() else {
            return;
        };

        let weak: Weak<Self> = Arc::downgrade(self);
        self.spawn_timer(async move {
            while let Some(envelope) = receiver.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.handle(envelope);
            }
        });
    }

    /// Begin a connection attempt on every idle or closed link
    fn open_links(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }

        let attempts: Vec<(Arc<dyn Transport>, EventSink)> = {
            let mut links = self.links.lock();
            links
                .entries
                .iter_mut()
                .filter(|link| link.state.can_open())
                .map(|link| {
                    link.cancel_reconnect();
                    link.state = LinkState::Connecting;
                    link.epoch += 1;
                    let sink = EventSink::new(link.kind(), link.epoch, self.events.clone());
                    (Arc::clone(&link.transport), sink)
                })
                .collect()
        };

        for (transport, sink) in attempts {
            tracing::info!(transport = %transport.kind(), epoch = sink.epoch(), "Connecting");
            transport.open(sink);
        }
    }

    fn handle(self: &Arc<Self>, envelope: Envelope) {
        if self.is_closed() {
            return;
        }

        let Envelope { kind, epoch, event } = envelope;
        let current = self.links.lock().get(kind).map(|l| l.epoch) == Some(epoch);
        if !current {
            tracing::trace!(transport = %kind, epoch, "Ignoring event from superseded connection");
            return;
        }

        match event {
            TransportEvent::Opened => self.on_open(kind, epoch),
            TransportEvent::Received(inbound) => self.on_inbound(inbound),
            TransportEvent::Closed { reason } => {
                tracing::info!(transport = %kind, reason = ?reason, "Connection closed");
                self.on_lost(kind);
            }
            TransportEvent::ConnectFailed { reason } => {
                tracing::info!(transport = %kind, reason = %reason, "Failed to connect");
                self.on_lost(kind);
            }
        }
    }

    /// Send the handshake, then publish `Open`.
    ///
    /// The registry stays locked until the link is open, so a concurrent
    /// subscribe is either in the replay or announced on the open link, and
    /// no user send can overtake the handshake.
    fn on_open(self: &Arc<Self>, kind: TransportKind, epoch: u64) {
        let Some(transport) = self.links.lock().get(kind).map(|l| Arc::clone(&l.transport)) else {
            return;
        };

        {
            let registry = self.registry.lock();
            for unit in handshake(kind, &registry) {
                if let Err(e) = transport.send(unit) {
                    tracing::warn!(transport = %kind, error = %e, "Handshake failed; reconnecting");
                    drop(registry);
                    self.on_lost(kind);
                    return;
                }
            }

            let mut links = self.links.lock();
            match links.get_mut(kind) {
                Some(link) if link.epoch == epoch && link.state == LinkState::Connecting => {
                    link.state = LinkState::Open;
                }
                _ => return,
            }
        }
        tracing::info!(transport = %kind, "Connection open");

        if kind == self.primary_kind() {
            let after_open = self.after_open.lock().clone();
            if let Some(after_open) = after_open {
                after_open();
            }
        }

        self.schedule_notice_dismissal();

        if kind == TransportKind::Legacy {
            self.start_keepalive();
        }
    }

    fn on_inbound(&self, inbound: Inbound) {
        let result = match &inbound {
            Inbound::Text(text) => self.router.route_legacy(text),
            Inbound::Publish { topic, payload } => self.router.route_broker(topic, payload),
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "Dropping malformed inbound message");
        }
    }

    /// Connection lost, connect failed, or a write failed
    fn on_lost(self: &Arc<Self>, kind: TransportKind) {
        if let Some(link) = self.links.lock().get_mut(kind) {
            link.state = LinkState::Closed;
        }
        self.show_notice();
        self.schedule_reconnect(kind);
    }

    fn show_notice(&self) {
        let shown = self.notice_shown.lock();
        if !shown.get() {
            shown.set(true);
            self.notice.show();
        }
    }

    fn dismiss_notice_if_open(&self) {
        let shown = self.notice_shown.lock();
        if shown.get() && self.links.lock().all_open() {
            shown.set(false);
            self.notice.dismiss();
        }
    }

    /// At most one pending reconnect per transport
    fn schedule_reconnect(self: &Arc<Self>, kind: TransportKind) {
        if self.is_closed() {
            return;
        }

        let mut links = self.links.lock();
        let Some(link) = links.get_mut(kind) else {
            return;
        };
        if link.reconnect_pending() {
            return;
        }

        let delay = self.settings.reconnect_delay;
        tracing::info!(transport = %kind, delay_secs = delay.as_secs(), "Reconnect scheduled");

        let weak = Arc::downgrade(self);
        link.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                tracing::info!(transport = %kind, "Attempting to reconnect");
                shared.open_links();
            }
        }));
    }

    /// Hide the notice after the grace delay if everything is still open
    fn schedule_notice_dismissal(self: &Arc<Self>) {
        if !self.notice_shown.lock().get() {
            return;
        }

        let weak = Arc::downgrade(self);
        let grace = self.settings.notice_grace;
        self.spawn_timer(async move {
            tokio::time::sleep(grace).await;
            if let Some(shared) = weak.upgrade() {
                shared.dismiss_notice_if_open();
            }
        });
    }

    /// Keepalive runs for the life of the session once started
    fn start_keepalive(self: &Arc<Self>) {
        if self.keepalive_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak = Arc::downgrade(self);
        let period = self.settings.keepalive_interval;
        self.spawn_timer(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let folder = shared.registry.lock().default_target().cloned();
                shared.send_control(OutboundFrame::ping(folder));
            }
        });
    }

    /// Send a newly added subscription on the given open transports
    fn announce(
        self: &Arc<Self>,
        subscription: &Subscription,
        kinds: &[TransportKind],
        default_target: Option<TopicPath>,
    ) {
        for &kind in kinds {
            match kind {
                TransportKind::Legacy => {
                    let frame = OutboundFrame::subscribe(
                        std::slice::from_ref(subscription),
                        default_target.clone(),
                    );
                    self.send_control(frame);
                }
                TransportKind::Broker => {
                    let topic = subscription.topic.to_broker().to_string();
                    self.transmit(kind, Outbound::Subscribe { topic });
                }
            }
        }
    }

    /// Encode and send a legacy control frame
    fn send_control(self: &Arc<Self>, frame: OutboundFrame) -> bool {
        match frame.encode() {
            Ok(text) => self.transmit(TransportKind::Legacy, Outbound::Text(text)),
            Err(e) => {
                tracing::warn!(kind = %frame.kind, error = %e, "Failed to encode frame");
                false
            }
        }
    }

    /// Hand a unit to an open transport.
    ///
    /// A failed write counts as a lost connection; a full queue only drops the unit.
    fn transmit(self: &Arc<Self>, kind: TransportKind, unit: Outbound) -> bool {
        let transport = {
            let links = self.links.lock();
            match links.get(kind) {
                Some(link) if link.state == LinkState::Open => Arc::clone(&link.transport),
                _ => return false,
            }
        };

        match transport.send(unit) {
            Ok(()) => true,
            Err(e) if e.is_connection_lost() => {
                tracing::warn!(transport = %kind, error = %e, "Send failed; reconnecting");
                self.on_lost(kind);
                false
            }
            Err(e) => {
                tracing::warn!(transport = %kind, error = %e, "Send dropped");
                false
            }
        }
    }

    fn open_kinds(&self) -> Vec<TransportKind> {
        self.links
            .lock()
            .entries
            .iter()
            .filter(|l| l.state == LinkState::Open)
            .map(|l| l.kind())
            .collect()
    }

    /// Transport whose open runs the after-open callback
    fn primary_kind(&self) -> TransportKind {
        if self.links.lock().get(TransportKind::Legacy).is_some() {
            TransportKind::Legacy
        } else {
            TransportKind::Broker
        }
    }

    fn spawn_timer<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut timers = self.timers.lock();
        timers.retain(|t| !t.is_finished());
        timers.push(tokio::spawn(future));
    }
}

/// Units sent on every open, before the link is usable
fn handshake(kind: TransportKind, registry: &SubscriptionRegistry) -> Vec<Outbound> {
    match kind {
        TransportKind::Legacy => {
            let default_target = registry.default_target().cloned();
            tracing::debug!(count = registry.len(), "Sending subscriptions");
            [
                OutboundFrame::connect(default_target.clone()),
                OutboundFrame::subscribe(registry.current_set(), default_target),
            ]
            .into_iter()
            .filter_map(|frame| match frame.encode() {
                Ok(text) => Some(Outbound::Text(text)),
                Err(e) => {
                    tracing::warn!(kind = %frame.kind, error = %e, "Failed to encode frame");
                    None
                }
            })
            .collect()
        }
        TransportKind::Broker if registry.is_empty() => Vec::new(),
        // One request, so the replay never fills the client's queue
        TransportKind::Broker => vec![Outbound::SubscribeMany {
            topics: registry
                .current_set()
                .iter()
                .map(|s| s.topic.to_broker().to_string())
                .collect(),
        }],
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for timer in self.timers.get_mut().drain(..) {
            timer.abort();
        }
        for link in self.links.get_mut().entries.iter_mut() {
            link.cancel_reconnect();
        }
    }
}
