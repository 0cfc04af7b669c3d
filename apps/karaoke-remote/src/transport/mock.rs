//! In-memory hub used by tests and offline runs. Every built connection shares
//! one scripted state: which modes fail to start, how joins are answered and
//! everything the client sent.

use async_trait::async_trait;
use parking_lot::Mutex;
use remote_proto::{Envelope, JoinResult, hub};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use super::{
    ConnectionPolicy, EventSink, HubConnection, TransportError, TransportEvent, TransportFactory,
    TransportMode,
};

#[derive(Default)]
struct MockState {
    built: Vec<TransportMode>,
    failing_modes: HashSet<TransportMode>,
    start_delay: Option<Duration>,
    join_replies: VecDeque<Result<JoinResult, String>>,
    fail_sends: bool,
    sent: Vec<(String, Vec<Value>)>,
    invoked: Vec<(String, Vec<Value>)>,
    sinks: Vec<EventSink>,
    stops: usize,
}

#[derive(Clone, Default)]
pub struct MockTransportFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `start` fail for every connection built in `mode`.
    pub fn fail_mode(&self, mode: TransportMode) {
        self.state.lock().failing_modes.insert(mode);
    }

    pub fn heal_mode(&self, mode: TransportMode) {
        self.state.lock().failing_modes.remove(&mode);
    }

    pub fn set_start_delay(&self, delay: Duration) {
        self.state.lock().start_delay = Some(delay);
    }

    /// Queues the answer to the next `JoinRemote`. Unscripted joins succeed.
    pub fn push_join_reply(&self, reply: JoinResult) {
        self.state.lock().join_replies.push_back(Ok(reply));
    }

    pub fn push_join_fault(&self, message: impl Into<String>) {
        self.state.lock().join_replies.push_back(Err(message.into()));
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    pub fn builds(&self) -> Vec<TransportMode> {
        self.state.lock().built.clone()
    }

    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }

    pub fn invocations(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().invoked.clone()
    }

    pub fn join_count(&self) -> usize {
        self.state
            .lock()
            .invoked
            .iter()
            .filter(|(method, _)| method == hub::JOIN_REMOTE)
            .count()
    }

    /// Envelopes delivered through `SendFromRemote`, in send order.
    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|(method, _)| method == hub::SEND_FROM_REMOTE)
            .filter_map(|(_, args)| args.first())
            .filter_map(|arg| serde_json::from_value(arg.clone()).ok())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    /// Raises `event` on the most recently built connection.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let sink = self.state.lock().sinks.last().cloned();
        sink.is_some_and(|sink| sink.emit(event))
    }

    /// Raises `event` on the connection built `index`-th (zero based).
    pub fn emit_on(&self, index: usize, event: TransportEvent) -> bool {
        let sink = self.state.lock().sinks.get(index).cloned();
        sink.is_some_and(|sink| sink.emit(event))
    }

    pub fn push_message(&self, envelope: Envelope) -> bool {
        self.emit(TransportEvent::Message(envelope))
    }
}

impl TransportFactory for MockTransportFactory {
    fn build(
        &self,
        mode: TransportMode,
        _policy: &ConnectionPolicy,
        events: EventSink,
    ) -> Arc<dyn HubConnection> {
        let mut state = self.state.lock();
        state.built.push(mode);
        state.sinks.push(events);
        Arc::new(MockConnection {
            mode,
            state: Arc::clone(&self.state),
        })
    }
}

struct MockConnection {
    mode: TransportMode,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl HubConnection for MockConnection {
    fn mode(&self) -> TransportMode {
        self.mode
    }

    async fn start(&self) -> Result<(), TransportError> {
        let delay = self.state.lock().start_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.lock().failing_modes.contains(&self.mode) {
            return Err(TransportError::Handshake(format!(
                "mock {} start refused",
                self.mode
            )));
        }
        Ok(())
    }

    fn send(&self, method: &str, args: Vec<Value>) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(TransportError::Closed);
        }
        state.sent.push((method.to_string(), args));
        Ok(())
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, TransportError> {
        let reply = {
            let mut state = self.state.lock();
            state.invoked.push((method.to_string(), args));
            if method == hub::JOIN_REMOTE {
                state.join_replies.pop_front()
            } else {
                None
            }
        };
        match reply {
            Some(Ok(result)) => Ok(serde_json::to_value(result)?),
            Some(Err(message)) => Err(TransportError::Invocation(message)),
            None if method == hub::JOIN_REMOTE => Ok(serde_json::to_value(JoinResult::accepted())?),
            None => Ok(Value::Null),
        }
    }

    async fn stop(&self) {
        self.state.lock().stops += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test_timeout::tokio_timeout_test]
    async fn scripts_start_and_join() {
        let factory = MockTransportFactory::new();
        factory.fail_mode(TransportMode::Direct);
        factory.push_join_reply(JoinResult::rejected("ROOM_FULL"));

        let (tx, _rx) = mpsc::unbounded_channel();
        let policy = ConnectionPolicy::default();
        let direct = factory.build(TransportMode::Direct, &policy, EventSink::new(1, tx.clone()));
        assert!(direct.start().await.is_err());

        let negotiated = factory.build(TransportMode::Negotiated, &policy, EventSink::new(2, tx));
        negotiated.start().await.unwrap();
        let reply = negotiated
            .invoke(hub::JOIN_REMOTE, vec![Value::from("abc")])
            .await
            .unwrap();
        assert_eq!(reply["code"], "ROOM_FULL");
        let reply = negotiated
            .invoke(hub::JOIN_REMOTE, vec![Value::from("abc")])
            .await
            .unwrap();
        assert_eq!(reply["ok"], true);

        assert_eq!(
            factory.builds(),
            vec![TransportMode::Direct, TransportMode::Negotiated]
        );
        assert_eq!(factory.join_count(), 2);
    }

    #[test_timeout::tokio_timeout_test]
    async fn events_reach_latest_connection_sink() {
        let factory = MockTransportFactory::new();
        assert!(!factory.emit(TransportEvent::Reconnected));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let policy = ConnectionPolicy::default();
        factory.build(TransportMode::Direct, &policy, EventSink::new(1, tx.clone()));
        factory.build(TransportMode::Direct, &policy, EventSink::new(2, tx));
        assert!(factory.emit(TransportEvent::Reconnected));
        assert_eq!(rx.recv().await.unwrap().generation, 2);
    }
}
