//! The resilient session client: owns the hub connection, the outbound queue
//! and the player state, and drives the connect → join → flush sequence.

pub mod dispatch;
pub mod lifecycle;
pub mod queue;
pub mod state;

use parking_lot::{Mutex, RwLock};
use remote_proto::{
    Command, Envelope, InboundEvent, JoinRejection, JoinResult, Kind, hub,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::SessionId;
use crate::transport::{
    ConnectionPolicy, EventSink, HubConnection, TaggedEvent, TransportError, TransportEvent,
    TransportFactory, TransportMode,
};
use crate::wake_lock::WakeLockGuard;

pub use dispatch::{EventHandler, HandlerRegistry};
pub use lifecycle::{LifecycleTrigger, SequenceOutcome};
pub use queue::{Enqueued, OutboundQueue, QueuePolicy, QueueStats};
pub use state::{ConnectionState, PlayerState};

use lifecycle::SequenceGuard;

pub const DEFAULT_SEARCH_KEYWORD: &str = "karaoke";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sid: SessionId,
    /// Start with a direct WebSocket; otherwise go straight to the fallback.
    pub prefer_primary: bool,
    pub policy: ConnectionPolicy,
    pub queue: QueuePolicy,
    /// Keyword of the search sent after the first inbound event.
    pub default_search: String,
}

impl SessionConfig {
    pub fn new(sid: SessionId) -> Self {
        Self {
            sid,
            prefer_primary: true,
            policy: ConnectionPolicy::default(),
            queue: QueuePolicy::default(),
            default_search: DEFAULT_SEARCH_KEYWORD.to_string(),
        }
    }
}

#[derive(Debug, Error)]
#[error("could not reach the hub (primary: {primary}; fallback: {fallback})")]
pub struct ConnectError {
    pub primary: TransportError,
    pub fallback: TransportError,
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("no active hub connection")]
    NotConnected,
    #[error("join call failed: {0}")]
    Transport(#[from] TransportError),
    #[error("invalid join reply: {0}")]
    InvalidReply(String),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What happened to an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued(Enqueued),
    /// Handed to a connected transport that refused it. Not retried.
    Failed,
}

/// Connection lifecycle notifications for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    State(ConnectionState),
    Joined,
    JoinRejected {
        rejection: JoinRejection,
        result: JoinResult,
    },
    ConnectFailed(String),
}

pub type StatusHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Inner {
    connection: Option<(u64, Arc<dyn HubConnection>)>,
    state: ConnectionState,
    joined: bool,
    queue: OutboundQueue,
    first_search_sent: bool,
    player: PlayerState,
}

pub struct SessionClient {
    config: SessionConfig,
    factory: Arc<dyn TransportFactory>,
    wake_lock: Arc<WakeLockGuard>,
    inner: Mutex<Inner>,
    handlers: HandlerRegistry,
    status_handlers: RwLock<Vec<StatusHandler>>,
    sequence_running: AtomicBool,
    generation: AtomicU64,
    disposed: AtomicBool,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    pump: Mutex<Option<JoinHandle<()>>>,
    restart: Mutex<Option<JoinHandle<()>>>,
}

impl SessionClient {
    /// Creates the client and its event pump. Nothing connects until
    /// [`SessionClient::connect_sequence`] or [`SessionClient::start`] runs,
    /// so handlers can be registered first.
    pub fn create(
        config: SessionConfig,
        factory: Arc<dyn TransportFactory>,
        wake_lock: Arc<WakeLockGuard>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let queue = OutboundQueue::new(config.queue.clone());
        let client = Arc::new(Self {
            config,
            factory,
            wake_lock,
            inner: Mutex::new(Inner {
                connection: None,
                state: ConnectionState::Disconnected,
                joined: false,
                queue,
                first_search_sent: false,
                player: PlayerState::default(),
            }),
            handlers: HandlerRegistry::default(),
            status_handlers: RwLock::new(Vec::new()),
            sequence_running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            events_tx,
            pump: Mutex::new(None),
            restart: Mutex::new(None),
        });
        let pump = tokio::spawn(pump_events(Arc::downgrade(&client), events_rx));
        *client.pump.lock() = Some(pump);
        client
    }

    pub fn sid(&self) -> &SessionId {
        &self.config.sid
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_joined(&self) -> bool {
        self.inner.lock().joined
    }

    pub fn player_state(&self) -> PlayerState {
        self.inner.lock().player.clone()
    }

    pub fn queued(&self) -> Vec<Envelope> {
        self.inner.lock().queue.snapshot()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.inner.lock().queue.stats()
    }

    pub fn first_search_sent(&self) -> bool {
        self.inner.lock().first_search_sent
    }

    pub fn current_mode(&self) -> Option<TransportMode> {
        self.inner
            .lock()
            .connection
            .as_ref()
            .map(|(_, connection)| connection.mode())
    }

    /// Registers `handler` for inbound events whose op is `name`, or for every
    /// inbound event when `name` is [`hub::ON_MESSAGE`].
    pub fn on<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Envelope, &PlayerState) + Send + Sync + 'static,
    {
        self.handlers.register(name, Arc::new(handler));
    }

    pub fn on_status<F>(&self, handler: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.status_handlers.write().push(Arc::new(handler));
    }

    /// Connects, trying the preferred mode first and the negotiated fallback
    /// after [`ConnectionPolicy::fallback_delay`]. The previous connection, if
    /// any, is stopped first.
    pub async fn start(&self, prefer_primary: bool) -> Result<(), ConnectError> {
        let first = if prefer_primary {
            TransportMode::Direct
        } else {
            TransportMode::Negotiated
        };
        let primary = match self.try_start(first).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        warn!(
            target: "karaoke::session",
            mode = %first,
            error = %primary,
            "hub start failed, trying fallback"
        );
        tokio::time::sleep(self.config.policy.fallback_delay).await;
        match self.try_start(TransportMode::Negotiated).await {
            Ok(()) => Ok(()),
            Err(fallback) => {
                self.set_state(ConnectionState::Disconnected);
                Err(ConnectError { primary, fallback })
            }
        }
    }

    async fn try_start(&self, mode: TransportMode) -> Result<(), TransportError> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let sink = EventSink::new(generation, self.events_tx.clone());
        let connection = self.factory.build(mode, &self.config.policy, sink);
        let previous = {
            let mut inner = self.inner.lock();
            inner.joined = false;
            inner.connection.replace((generation, Arc::clone(&connection)))
        };
        self.set_state(ConnectionState::Connecting);
        if let Some((_, previous)) = previous {
            previous.stop().await;
        }

        debug!(target: "karaoke::session", %mode, generation, "starting hub connection");
        match connection.start().await {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                info!(target: "karaoke::session", %mode, "hub connected");
                Ok(())
            }
            Err(err) => {
                connection.stop().await;
                let mut inner = self.inner.lock();
                if inner.connection.as_ref().map(|(g, _)| *g) == Some(generation) {
                    inner.connection = None;
                }
                Err(err)
            }
        }
    }

    /// Registers this remote with the host session.
    pub async fn join(&self, sid: &str) -> Result<JoinResult, JoinError> {
        let (generation, connection) = self
            .inner
            .lock()
            .connection
            .clone()
            .ok_or(JoinError::NotConnected)?;
        let reply = connection
            .invoke(hub::JOIN_REMOTE, vec![Value::String(sid.to_string())])
            .await?;
        let result: JoinResult =
            serde_json::from_value(reply).map_err(|err| JoinError::InvalidReply(err.to_string()))?;
        let mut inner = self.inner.lock();
        if inner.connection.as_ref().map(|(g, _)| *g) == Some(generation) {
            inner.joined = result.ok;
        }
        Ok(result)
    }

    async fn join_and_flush(&self) -> Result<JoinResult, JoinError> {
        let result = self.join(self.config.sid.as_str()).await?;
        match result.rejection() {
            None => {
                info!(target: "karaoke::session", sid = %self.config.sid, "joined session");
                self.notify(SessionEvent::Joined);
                self.flush();
            }
            Some(rejection) => {
                warn!(
                    target: "karaoke::session",
                    code = ?result.code,
                    reason = %rejection,
                    "join rejected"
                );
                self.notify(SessionEvent::JoinRejected {
                    rejection,
                    result: result.clone(),
                });
            }
        }
        Ok(result)
    }

    /// The full boot path: wake lock, start (with fallback), join, flush.
    /// Only one sequence runs at a time; overlapping calls return
    /// [`SequenceOutcome::AlreadyRunning`].
    pub async fn connect_sequence(self: &Arc<Self>) -> SequenceOutcome {
        let Some(_guard) = SequenceGuard::acquire(&self.sequence_running) else {
            debug!(target: "karaoke::session", "connect sequence already running");
            return SequenceOutcome::AlreadyRunning;
        };
        if self.disposed.load(Ordering::Acquire) {
            return SequenceOutcome::Disposed;
        }

        self.wake_lock.acquire().await;

        if let Err(err) = self.start(self.config.prefer_primary).await {
            error!(target: "karaoke::session", error = %err, "connect sequence failed");
            let message = err.to_string();
            self.notify(SessionEvent::ConnectFailed(message.clone()));
            self.schedule_restart();
            return SequenceOutcome::ConnectFailed(message);
        }

        self.join_outcome().await
    }

    /// Retries the join on a live connection whose earlier join faulted or
    /// was rejected. Shares the single-flight guard with `connect_sequence`.
    async fn rejoin_sequence(&self) -> SequenceOutcome {
        let Some(_guard) = SequenceGuard::acquire(&self.sequence_running) else {
            debug!(target: "karaoke::session", "connect sequence already running");
            return SequenceOutcome::AlreadyRunning;
        };
        if self.disposed.load(Ordering::Acquire) {
            return SequenceOutcome::Disposed;
        }
        self.wake_lock.acquire().await;
        info!(target: "karaoke::session", "connected but not joined, retrying join");
        self.join_outcome().await
    }

    async fn join_outcome(&self) -> SequenceOutcome {
        match self.join_and_flush().await {
            Ok(result) if result.ok => SequenceOutcome::Joined,
            Ok(result) => SequenceOutcome::Rejected(result),
            Err(err) => {
                warn!(target: "karaoke::session", error = %err, "join failed");
                SequenceOutcome::JoinFailed(err.to_string())
            }
        }
    }

    /// Reacts to a page lifecycle signal. Returns the outcome when a connect
    /// sequence (or a join retry on a live but unjoined connection) ran.
    pub async fn handle_trigger(self: &Arc<Self>, trigger: LifecycleTrigger) -> Option<SequenceOutcome> {
        debug!(target: "karaoke::session", ?trigger, "lifecycle trigger");
        match trigger {
            LifecycleTrigger::VisibilityChanged(false) => {
                self.wake_lock.set_visible(false).await;
                return None;
            }
            LifecycleTrigger::VisibilityChanged(true) => self.wake_lock.set_visible(true).await,
            LifecycleTrigger::Boot | LifecycleTrigger::Online | LifecycleTrigger::PageShow => {}
        }
        let (state, joined) = {
            let inner = self.inner.lock();
            (inner.state, inner.joined)
        };
        match state {
            ConnectionState::Disconnected => Some(self.connect_sequence().await),
            ConnectionState::Connected if !joined => Some(self.rejoin_sequence().await),
            _ => {
                self.wake_lock.acquire().await;
                None
            }
        }
    }

    /// Sends a raw `op`/`data` pair, or queues it while not connected.
    pub fn send(&self, op: &str, data: Value) -> Delivery {
        let envelope = Envelope::new(self.config.sid.as_str(), Kind::for_op(op), op, data);
        self.send_envelope(envelope)
    }

    pub fn dispatch(&self, command: &Command) -> Delivery {
        self.send_envelope(Envelope::from_command(self.config.sid.as_str(), command))
    }

    fn send_envelope(&self, envelope: Envelope) -> Delivery {
        let connection = {
            let mut inner = self.inner.lock();
            match (&inner.connection, inner.state) {
                (Some((_, connection)), ConnectionState::Connected) => Arc::clone(connection),
                _ => {
                    let op = envelope.op.clone();
                    let outcome = inner.queue.push(envelope);
                    debug!(
                        target: "karaoke::session",
                        %op,
                        state = %inner.state,
                        ?outcome,
                        queued = inner.queue.len(),
                        "queued outbound message"
                    );
                    return Delivery::Queued(outcome);
                }
            }
        };
        match transmit(connection.as_ref(), &envelope) {
            Ok(()) => {
                trace!(target: "karaoke::session", op = %envelope.op, rid = %envelope.rid, "sent");
                Delivery::Sent
            }
            Err(err) => {
                warn!(target: "karaoke::session", op = %envelope.op, error = %err, "send failed");
                Delivery::Failed
            }
        }
    }

    /// Sends everything queued, in order. The queue is emptied before the
    /// first send; messages that fail are logged and not re-queued.
    pub fn flush(&self) -> usize {
        let (connection, pending) = {
            let mut inner = self.inner.lock();
            let connection = match (&inner.connection, inner.state) {
                (Some((_, connection)), ConnectionState::Connected) => Arc::clone(connection),
                _ => return 0,
            };
            (connection, inner.queue.take_all())
        };
        if pending.is_empty() {
            return 0;
        }
        let total = pending.len();
        let mut sent = 0;
        for envelope in &pending {
            match transmit(connection.as_ref(), envelope) {
                Ok(()) => sent += 1,
                Err(err) => {
                    warn!(target: "karaoke::session", op = %envelope.op, error = %err, "queued send failed");
                }
            }
        }
        info!(target: "karaoke::session", sent, total, "flushed outbound queue");
        sent
    }

    /// Stops the connection and every background task. Later sends are
    /// queued and never delivered.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.restart.lock().take() {
            handle.abort();
        }
        let connection = {
            let mut inner = self.inner.lock();
            inner.joined = false;
            inner.connection.take()
        };
        if let Some((_, connection)) = connection {
            connection.stop().await;
        }
        self.set_state(ConnectionState::Disconnected);
        self.wake_lock.release().await;
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
        info!(target: "karaoke::session", "session disposed");
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = {
            let mut inner = self.inner.lock();
            let changed = inner.state != state;
            inner.state = state;
            changed
        };
        if changed {
            debug!(target: "karaoke::session", %state, "connection state changed");
            self.notify(SessionEvent::State(state));
        }
    }

    fn notify(&self, event: SessionEvent) {
        let handlers: Vec<StatusHandler> = self.status_handlers.read().clone();
        for handler in handlers {
            handler(&event);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().connection.as_ref().map(|(g, _)| *g) == Some(generation)
    }

    async fn handle_transport_event(self: &Arc<Self>, tagged: TaggedEvent) {
        if !self.is_current(tagged.generation) {
            trace!(
                target: "karaoke::session",
                generation = tagged.generation,
                "ignoring event from replaced connection"
            );
            return;
        }
        match tagged.event {
            TransportEvent::Message(envelope) => self.handle_inbound(envelope),
            TransportEvent::Reconnecting { error } => {
                warn!(target: "karaoke::session", ?error, "connection lost, transport reconnecting");
                self.inner.lock().joined = false;
                self.set_state(ConnectionState::Reconnecting);
            }
            TransportEvent::Reconnected => {
                info!(target: "karaoke::session", "transport reconnected, rejoining");
                self.set_state(ConnectionState::Connected);
                if let Err(err) = self.join_and_flush().await {
                    warn!(target: "karaoke::session", error = %err, "rejoin failed");
                }
            }
            TransportEvent::Closed { error } => {
                warn!(target: "karaoke::session", ?error, "connection closed");
                {
                    let mut inner = self.inner.lock();
                    inner.joined = false;
                    inner.connection = None;
                }
                self.set_state(ConnectionState::Disconnected);
                self.schedule_restart();
            }
        }
    }

    fn handle_inbound(&self, envelope: Envelope) {
        if !envelope.is_event() {
            debug!(target: "karaoke::session", op = %envelope.op, kind = envelope.kind.as_str(), "ignoring non-event message");
            return;
        }
        let parsed = match InboundEvent::from_envelope(&envelope) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(target: "karaoke::session", op = %envelope.op, error = %err, "unreadable event payload");
                None
            }
        };
        let (first_event, snapshot) = {
            let mut inner = self.inner.lock();
            if let Some(event) = parsed {
                inner.player.apply(event);
            }
            let first_event = !inner.first_search_sent;
            inner.first_search_sent = true;
            let snapshot = (!self.handlers.is_empty()).then(|| inner.player.clone());
            (first_event, snapshot)
        };

        if let Some(state) = snapshot {
            self.handlers.dispatch(&envelope, &state);
        }
        if first_event {
            debug!(target: "karaoke::session", keyword = %self.config.default_search, "sending initial search");
            self.dispatch(&Command::Search {
                keyword: self.config.default_search.clone(),
            });
        }
    }

    fn schedule_restart(self: &Arc<Self>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let delay = self.config.policy.restart_delay;
        let client = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(client) = client.upgrade() else {
                return;
            };
            if client.state() == ConnectionState::Disconnected {
                info!(target: "karaoke::session", "restarting connect sequence");
                client.connect_sequence().await;
            }
        });
        if let Some(previous) = self.restart.lock().replace(handle) {
            previous.abort();
        }
    }
}

fn transmit(connection: &dyn HubConnection, envelope: &Envelope) -> Result<(), SendError> {
    let payload = serde_json::to_value(envelope)?;
    connection.send(hub::SEND_FROM_REMOTE, vec![payload])?;
    Ok(())
}

async fn pump_events(client: Weak<SessionClient>, mut events: mpsc::UnboundedReceiver<TaggedEvent>) {
    while let Some(tagged) = events.recv().await {
        let Some(client) = client.upgrade() else {
            break;
        };
        client.handle_transport_event(tagged).await;
    }
}

#[cfg(test)]
mod tests;
