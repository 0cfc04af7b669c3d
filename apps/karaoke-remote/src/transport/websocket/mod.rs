use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use remote_proto::{Envelope, hub as hub_methods};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep, sleep_until, timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::hub::{self, HubFrame};
use super::{
    ConnectionPolicy, EventSink, HubConnection, TransportError, TransportEvent, TransportFactory,
    TransportMode,
};

pub mod config;

type HubSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingInvocations = HashMap<String, oneshot::Sender<Result<Value, TransportError>>>;

const NEGOTIATE_TIMEOUT: Duration = Duration::from_secs(10);
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Builds WebSocket hub connections for one hub URL.
#[derive(Clone)]
pub struct WebSocketFactory {
    hub_url: Url,
    http: reqwest::Client,
}

impl WebSocketFactory {
    pub fn new(hub_url: Url) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(NEGOTIATE_TIMEOUT)
            .build()?;
        Ok(Self { hub_url, http })
    }

    pub fn hub_url(&self) -> &Url {
        &self.hub_url
    }
}

impl TransportFactory for WebSocketFactory {
    fn build(
        &self,
        mode: TransportMode,
        policy: &ConnectionPolicy,
        events: EventSink,
    ) -> Arc<dyn HubConnection> {
        Arc::new(WebSocketHubConnection::new(
            mode,
            self.hub_url.clone(),
            self.http.clone(),
            policy.clone(),
            events,
        ))
    }
}

pub struct WebSocketHubConnection {
    shared: Arc<Shared>,
}

struct Shared {
    mode: TransportMode,
    hub_url: Url,
    http: reqwest::Client,
    policy: ConnectionPolicy,
    events: EventSink,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: Mutex<PendingInvocations>,
    next_invocation: AtomicU64,
    stopped: AtomicBool,
    stop: Notify,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegotiateResponse {
    #[serde(default)]
    connection_token: Option<String>,
    #[serde(default)]
    connection_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

enum SocketEnd {
    Stopped,
    Lost(Option<String>),
    ServerClosed {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

impl WebSocketHubConnection {
    pub fn new(
        mode: TransportMode,
        hub_url: Url,
        http: reqwest::Client,
        policy: ConnectionPolicy,
        events: EventSink,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                mode,
                hub_url,
                http,
                policy,
                events,
                outbound: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_invocation: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
                stop: Notify::new(),
                supervisor: Mutex::new(None),
            }),
        }
    }

    fn write(&self, frame: &HubFrame) -> Result<(), TransportError> {
        let text = hub::encode(frame)?;
        let outbound = self.shared.outbound.lock();
        match outbound.as_ref() {
            Some(tx) => tx.send(text).map_err(|_| TransportError::Closed),
            None => Err(TransportError::NotConnected),
        }
    }
}

#[async_trait]
impl HubConnection for WebSocketHubConnection {
    fn mode(&self) -> TransportMode {
        self.shared.mode
    }

    async fn start(&self) -> Result<(), TransportError> {
        let socket = self.shared.open().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock() = Some(tx);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move { shared.supervise(socket, rx).await });
        *self.shared.supervisor.lock() = Some(handle);
        info!(
            target: "karaoke::transport",
            mode = %self.shared.mode,
            url = %self.shared.hub_url,
            "hub connection started"
        );
        Ok(())
    }

    fn send(&self, method: &str, args: Vec<Value>) -> Result<(), TransportError> {
        self.write(&HubFrame::invocation(None, method, args))
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, TransportError> {
        let id = self
            .shared
            .next_invocation
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id.clone(), tx);
        if let Err(err) = self.write(&HubFrame::invocation(Some(id.clone()), method, args)) {
            self.shared.pending.lock().remove(&id);
            return Err(err);
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Closed),
        }
    }

    async fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.stop.notify_one();
        let handle = self.shared.supervisor.lock().take();
        if let Some(mut handle) = handle {
            if timeout(STOP_GRACE, &mut handle).await.is_err() {
                debug!(target: "karaoke::transport", "supervisor did not exit in time, aborting");
                handle.abort();
            }
        }
        self.shared.outbound.lock().take();
        self.shared.fail_pending();
    }
}

impl Drop for WebSocketHubConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.supervisor.lock().take() {
            handle.abort();
        }
    }
}

impl Shared {
    async fn open(&self) -> Result<HubSocket, TransportError> {
        let url = match self.mode {
            TransportMode::Direct => config::websocket_url(&self.hub_url, None)?,
            TransportMode::Negotiated => {
                let token = self.negotiate().await?;
                config::websocket_url(&self.hub_url, Some(&token))?
            }
        };
        debug!(target: "karaoke::transport", mode = %self.mode, %url, "opening websocket");

        let (mut socket, _) = timeout(self.policy.handshake_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout("connecting to hub"))??;
        socket.send(Message::Text(hub::handshake_request())).await?;

        let reply = timeout(self.policy.handshake_timeout, next_text(&mut socket))
            .await
            .map_err(|_| TransportError::Timeout("waiting for hub handshake"))??;
        let mut records = hub::records(&reply);
        let first = records
            .next()
            .ok_or_else(|| TransportError::Handshake("empty handshake reply".into()))?;
        hub::check_handshake(first)?;
        for extra in records {
            trace!(target: "karaoke::transport", record = extra, "dropping record batched with handshake");
        }
        Ok(socket)
    }

    async fn negotiate(&self) -> Result<String, TransportError> {
        let url = config::negotiate_url(&self.hub_url);
        let response = self.http.post(url).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(response.status()));
        }
        let body: NegotiateResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(TransportError::Handshake(error));
        }
        body.connection_token
            .or(body.connection_id)
            .ok_or_else(|| TransportError::Protocol("negotiate reply carried no connection token".into()))
    }

    async fn supervise(self: Arc<Self>, socket: HubSocket, rx: mpsc::UnboundedReceiver<String>) {
        let mut socket = socket;
        let mut rx = rx;
        loop {
            let end = self.run_socket(socket, &mut rx).await;
            self.outbound.lock().take();
            self.fail_pending();

            let error = match end {
                SocketEnd::Stopped => return,
                SocketEnd::ServerClosed {
                    error,
                    allow_reconnect: false,
                } => {
                    info!(target: "karaoke::transport", ?error, "hub closed the connection");
                    self.events.emit(TransportEvent::Closed { error });
                    return;
                }
                SocketEnd::ServerClosed { error, .. } | SocketEnd::Lost(error) => error,
            };
            if self.stopped.load(Ordering::Acquire) {
                return;
            }

            warn!(target: "karaoke::transport", ?error, "hub connection lost, reconnecting");
            self.events.emit(TransportEvent::Reconnecting { error });
            match self.reconnect().await {
                Some(next) => {
                    let (tx, next_rx) = mpsc::unbounded_channel();
                    *self.outbound.lock() = Some(tx);
                    socket = next;
                    rx = next_rx;
                    info!(target: "karaoke::transport", "hub connection restored");
                    self.events.emit(TransportEvent::Reconnected);
                }
                None => {
                    if !self.stopped.load(Ordering::Acquire) {
                        self.events.emit(TransportEvent::Closed {
                            error: Some("reconnect attempts exhausted".into()),
                        });
                    }
                    return;
                }
            }
        }
    }

    async fn reconnect(&self) -> Option<HubSocket> {
        let mut attempt = 0;
        while let Some(delay) = self.policy.reconnect_delay(attempt) {
            if !delay.is_zero() {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = self.stop.notified() => return None,
                }
            }
            if self.stopped.load(Ordering::Acquire) {
                return None;
            }
            match self.open().await {
                Ok(socket) => return Some(socket),
                Err(err) => {
                    warn!(target: "karaoke::transport", attempt, error = %err, "reconnect attempt failed");
                }
            }
            attempt += 1;
        }
        None
    }

    async fn run_socket(&self, socket: HubSocket, rx: &mut mpsc::UnboundedReceiver<String>) -> SocketEnd {
        if self.stopped.load(Ordering::Acquire) {
            return SocketEnd::Stopped;
        }
        let (mut sink, mut stream) = socket.split();
        let keep_alive = self.policy.keep_alive_interval;
        let mut ping = interval_at(Instant::now() + keep_alive, keep_alive);
        let mut last_inbound = Instant::now();

        loop {
            let idle_deadline = last_inbound + self.policy.server_timeout;
            tokio::select! {
                _ = self.stop.notified() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SocketEnd::Stopped;
                }
                outbound = rx.recv() => match outbound {
                    Some(text) => {
                        if let Err(err) = sink.send(Message::Text(text)).await {
                            return SocketEnd::Lost(Some(err.to_string()));
                        }
                    }
                    None => return SocketEnd::Lost(None),
                },
                _ = ping.tick() => {
                    let text = match hub::encode(&HubFrame::ping()) {
                        Ok(text) => text,
                        Err(err) => return SocketEnd::Lost(Some(err.to_string())),
                    };
                    if let Err(err) = sink.send(Message::Text(text)).await {
                        return SocketEnd::Lost(Some(err.to_string()));
                    }
                }
                _ = sleep_until(idle_deadline) => {
                    return SocketEnd::Lost(Some(format!(
                        "server sent nothing for {}s",
                        self.policy.server_timeout.as_secs()
                    )));
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        last_inbound = Instant::now();
                        if let Some(end) = self.handle_text(&text) {
                            return end;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return SocketEnd::Lost(frame.map(|frame| frame.reason.to_string()));
                    }
                    Some(Ok(_)) => last_inbound = Instant::now(),
                    Some(Err(err)) => return SocketEnd::Lost(Some(err.to_string())),
                    None => return SocketEnd::Lost(None),
                },
            }
        }
    }

    fn handle_text(&self, text: &str) -> Option<SocketEnd> {
        for record in hub::records(text) {
            let frame = match hub::decode(record) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(target: "karaoke::transport", error = %err, "dropping malformed hub record");
                    continue;
                }
            };
            match frame.frame_type {
                hub::FRAME_INVOCATION => self.handle_invocation(frame),
                hub::FRAME_COMPLETION => self.complete(frame),
                hub::FRAME_PING => {}
                hub::FRAME_CLOSE => {
                    return Some(SocketEnd::ServerClosed {
                        error: frame.error,
                        allow_reconnect: frame.allow_reconnect.unwrap_or(false),
                    });
                }
                other => {
                    trace!(target: "karaoke::transport", frame_type = other, "ignoring hub frame");
                }
            }
        }
        None
    }

    fn handle_invocation(&self, frame: HubFrame) {
        if frame.target.as_deref() != Some(hub_methods::ON_MESSAGE) {
            debug!(target: "karaoke::transport", target_method = ?frame.target, "ignoring hub invocation");
            return;
        }
        for argument in frame.arguments.unwrap_or_default() {
            match serde_json::from_value::<Envelope>(argument) {
                Ok(envelope) => {
                    self.events.emit(TransportEvent::Message(envelope));
                }
                Err(err) => {
                    warn!(target: "karaoke::transport", error = %err, "dropping malformed envelope");
                }
            }
        }
    }

    fn complete(&self, frame: HubFrame) {
        let Some(id) = frame.invocation_id else {
            return;
        };
        let Some(waiter) = self.pending.lock().remove(&id) else {
            debug!(target: "karaoke::transport", invocation_id = %id, "completion for unknown invocation");
            return;
        };
        let outcome = match frame.error {
            Some(error) => Err(TransportError::Invocation(error)),
            None => Ok(frame.result.unwrap_or(Value::Null)),
        };
        let _ = waiter.send(outcome);
    }

    fn fail_pending(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        for (_, waiter) in pending {
            let _ = waiter.send(Err(TransportError::Closed));
        }
    }
}

async fn next_text(socket: &mut HubSocket) -> Result<String, TransportError> {
    while let Some(message) = socket.next().await {
        match message? {
            Message::Text(text) => return Ok(text),
            Message::Close(_) => return Err(TransportError::Closed),
            Message::Binary(_) => {
                return Err(TransportError::Protocol("binary frame on json hub".into()));
            }
            _ => {}
        }
    }
    Err(TransportError::Closed)
}
