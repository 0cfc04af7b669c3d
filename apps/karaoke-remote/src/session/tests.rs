use super::*;
use crate::transport::mock::MockTransportFactory;
use crate::wake_lock::{NoWakeLock, WakeLockGuard};
use remote_proto::{JoinRejection, JoinResult, ops};
use serde_json::json;
use std::time::Duration;

const SID: &str = "abc123";

fn client_for(factory: &MockTransportFactory) -> Arc<SessionClient> {
    let wake_lock = WakeLockGuard::new(Arc::new(NoWakeLock));
    let config = SessionConfig::new(SessionId::new(SID).unwrap());
    SessionClient::create(config, Arc::new(factory.clone()), wake_lock)
}

fn evt(op: &str, data: Value) -> Envelope {
    Envelope::new(SID, Kind::Evt, op, data)
}

async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
}

fn record_status(client: &SessionClient) -> Arc<Mutex<Vec<SessionEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.on_status(move |event| sink.lock().push(event.clone()));
    seen
}

#[test_timeout::tokio_timeout_test]
async fn offline_commands_wait_in_queue() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);

    let delivery = client.dispatch(&Command::QueueRemove { position: 2 });
    assert_eq!(delivery, Delivery::Queued(Enqueued::Queued));

    let queued = client.queued();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].op, ops::QUEUE_REMOVE);
    assert_eq!(queued[0].kind, Kind::Cmd);
    assert_eq!(queued[0].sid, SID);
    assert_eq!(queued[0].data, json!({ "position": 2 }));
    assert!(factory.sent_envelopes().is_empty());

    assert_eq!(client.connect_sequence().await, SequenceOutcome::Joined);
    assert!(client.queued().is_empty());
    let sent = factory.sent_envelopes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].rid, queued[0].rid);
}

#[test_timeout::tokio_timeout_test]
async fn connected_sends_go_straight_out() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);
    client.connect_sequence().await;

    let delivery = client.send(ops::SEARCH, json!({ "keyword": "karaoke" }));
    assert_eq!(delivery, Delivery::Sent);
    let sent = factory.sent_envelopes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, Kind::Query);
    assert_eq!(sent[0].v, 1);
    assert_eq!(sent[0].data["keyword"], "karaoke");
    assert!(!sent[0].rid.is_empty());
}

#[test_timeout::tokio_timeout_test]
async fn state_gates_between_queue_and_send() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);
    let status = record_status(&client);

    client.connect_sequence().await;
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.dispatch(&Command::QueueMoveUp { position: 1 }), Delivery::Sent);

    factory.emit(TransportEvent::Reconnecting { error: None });
    settle().await;
    assert_eq!(client.state(), ConnectionState::Reconnecting);
    assert!(!client.is_joined());
    assert!(matches!(
        client.dispatch(&Command::QueueMoveUp { position: 1 }),
        Delivery::Queued(_)
    ));

    let states: Vec<ConnectionState> = status
        .lock()
        .iter()
        .filter_map(|event| match event {
            SessionEvent::State(state) => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting
        ]
    );
}

#[test_timeout::tokio_timeout_test]
async fn reconnect_rejoins_then_flushes_in_order() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);
    client.connect_sequence().await;

    factory.emit(TransportEvent::Reconnecting { error: Some("socket reset".into()) });
    settle().await;
    for position in 1..=3 {
        client.dispatch(&Command::QueueRemove { position });
    }
    assert_eq!(client.queued().len(), 3);
    assert!(factory.sent_envelopes().is_empty());

    factory.emit(TransportEvent::Reconnected);
    settle().await;

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(factory.join_count(), 2);
    assert!(client.is_joined());
    assert!(client.queued().is_empty());
    let positions: Vec<u64> = factory
        .sent_envelopes()
        .iter()
        .map(|envelope| envelope.data["position"].as_u64().unwrap())
        .collect();
    assert_eq!(positions, vec![1, 2, 3]);
}

#[test_timeout::tokio_timeout_test]
async fn failed_flush_sends_are_dropped() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);
    client.connect_sequence().await;

    factory.emit(TransportEvent::Reconnecting { error: None });
    settle().await;
    client.dispatch(&Command::QueueMoveFirst { position: 4 });
    factory.fail_sends(true);
    factory.emit(TransportEvent::Reconnected);
    settle().await;

    assert!(client.queued().is_empty());
    assert!(factory.sent_envelopes().is_empty());
    assert_eq!(client.dispatch(&Command::QueueMoveFirst { position: 4 }), Delivery::Failed);
}

#[test_timeout::tokio_timeout_test(paused)]
async fn overlapping_sequences_run_once() {
    let factory = MockTransportFactory::new();
    factory.set_start_delay(Duration::from_millis(100));
    let client = client_for(&factory);

    let (a, b, c) = tokio::join!(
        client.connect_sequence(),
        client.connect_sequence(),
        client.handle_trigger(LifecycleTrigger::Online),
    );
    let outcomes = [Some(a), Some(b), c];
    let joined = outcomes
        .iter()
        .filter(|o| **o == Some(SequenceOutcome::Joined))
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o, Some(SequenceOutcome::AlreadyRunning) | None))
        .count();
    assert_eq!(joined, 1);
    assert_eq!(skipped, 2);
    assert_eq!(factory.builds(), vec![TransportMode::Direct]);
    assert_eq!(factory.join_count(), 1);

    assert_eq!(client.connect_sequence().await, SequenceOutcome::Joined);
}

#[test_timeout::tokio_timeout_test]
async fn first_inbound_event_triggers_one_search() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);
    client.connect_sequence().await;
    assert!(!client.first_search_sent());

    factory.push_message(evt(ops::STATE_SNAPSHOT, json!({ "queueCount": 0 })));
    factory.push_message(evt(ops::QUEUE_CHANGED, json!({ "queueCount": 1 })));
    settle().await;

    let searches: Vec<Envelope> = factory
        .sent_envelopes()
        .into_iter()
        .filter(|envelope| envelope.op == ops::SEARCH)
        .collect();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].kind, Kind::Query);
    assert_eq!(searches[0].data, json!({ "keyword": "karaoke" }));
    assert!(client.first_search_sent());
}

#[test_timeout::tokio_timeout_test]
async fn initial_search_queues_while_reconnecting() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);
    client.connect_sequence().await;

    factory.emit(TransportEvent::Reconnecting { error: None });
    factory.push_message(evt(ops::STATE_SNAPSHOT, json!({})));
    settle().await;

    let queued = client.queued();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].op, ops::SEARCH);
    assert!(client.first_search_sent());
}

#[test_timeout::tokio_timeout_test]
async fn rejected_join_keeps_queue() {
    let factory = MockTransportFactory::new();
    factory.push_join_reply(JoinResult::rejected("SESSION_EXPIRED"));
    let client = client_for(&factory);
    let status = record_status(&client);

    client.dispatch(&Command::Search { keyword: "abba".into() });
    let outcome = client.connect_sequence().await;

    let SequenceOutcome::Rejected(result) = outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!(result.code.as_deref(), Some("SESSION_EXPIRED"));
    assert!(!client.is_joined());
    assert_eq!(client.queued().len(), 1);
    assert!(factory.sent_envelopes().is_empty());
    assert!(status.lock().iter().any(|event| matches!(
        event,
        SessionEvent::JoinRejected { rejection: JoinRejection::SessionExpired, .. }
    )));
}

#[test_timeout::tokio_timeout_test]
async fn join_fault_is_reported_not_retried() {
    let factory = MockTransportFactory::new();
    factory.push_join_fault("hub exploded");
    let client = client_for(&factory);

    let outcome = client.connect_sequence().await;
    assert!(matches!(outcome, SequenceOutcome::JoinFailed(ref msg) if msg.contains("hub exploded")));
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(factory.join_count(), 1);
}

#[test_timeout::tokio_timeout_test]
async fn trigger_retries_join_after_fault() {
    let factory = MockTransportFactory::new();
    factory.push_join_fault("transient hub error");
    let client = client_for(&factory);

    client.dispatch(&Command::QueueRemove { position: 1 });
    assert!(matches!(client.connect_sequence().await, SequenceOutcome::JoinFailed(_)));
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(!client.is_joined());
    assert_eq!(client.queued().len(), 1);

    assert_eq!(
        client.handle_trigger(LifecycleTrigger::Online).await,
        Some(SequenceOutcome::Joined)
    );
    assert!(client.is_joined());
    assert_eq!(factory.join_count(), 2);
    assert_eq!(factory.builds().len(), 1);
    assert!(client.queued().is_empty());
    assert_eq!(factory.sent_envelopes().len(), 1);

    // Joined again, so later triggers leave the connection alone.
    assert_eq!(client.handle_trigger(LifecycleTrigger::PageShow).await, None);
    assert_eq!(factory.join_count(), 2);
}

#[test_timeout::tokio_timeout_test(paused)]
async fn primary_failure_falls_back_after_delay() {
    let factory = MockTransportFactory::new();
    factory.fail_mode(TransportMode::Direct);
    let client = client_for(&factory);

    let started = tokio::time::Instant::now();
    client.start(true).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(
        factory.builds(),
        vec![TransportMode::Direct, TransportMode::Negotiated]
    );
    assert_eq!(factory.stops(), 1);
    assert_eq!(client.current_mode(), Some(TransportMode::Negotiated));
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[test_timeout::tokio_timeout_test(paused)]
async fn fallback_only_skips_direct() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);
    client.start(false).await.unwrap();
    assert_eq!(factory.builds(), vec![TransportMode::Negotiated]);
}

#[test_timeout::tokio_timeout_test(paused)]
async fn connect_failure_schedules_restart() {
    let factory = MockTransportFactory::new();
    factory.fail_mode(TransportMode::Direct);
    factory.fail_mode(TransportMode::Negotiated);
    let client = client_for(&factory);
    let status = record_status(&client);

    let outcome = client.connect_sequence().await;
    assert!(matches!(outcome, SequenceOutcome::ConnectFailed(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(status
        .lock()
        .iter()
        .any(|event| matches!(event, SessionEvent::ConnectFailed(_))));

    factory.heal_mode(TransportMode::Direct);
    tokio::time::sleep(Duration::from_millis(1_600)).await;
    settle().await;

    assert_eq!(factory.builds().len(), 3);
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.is_joined());
}

#[test_timeout::tokio_timeout_test(paused)]
async fn closed_connection_restarts_after_delay() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);
    client.connect_sequence().await;

    factory.emit(TransportEvent::Closed { error: Some("server shutdown".into()) });
    settle().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(client.dispatch(&Command::QueueRemove { position: 1 }), Delivery::Queued(_)));

    tokio::time::sleep(Duration::from_millis(1_300)).await;
    assert_eq!(factory.builds().len(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    settle().await;
    assert_eq!(factory.builds().len(), 2);
    assert_eq!(factory.join_count(), 2);
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.queued().is_empty());
}

#[test_timeout::tokio_timeout_test(paused)]
async fn events_from_replaced_connections_are_ignored() {
    let factory = MockTransportFactory::new();
    factory.fail_mode(TransportMode::Direct);
    let client = client_for(&factory);
    client.connect_sequence().await;

    assert!(factory.emit_on(0, TransportEvent::Closed { error: None }));
    assert!(factory.emit_on(0, TransportEvent::Message(evt(ops::STATE_SNAPSHOT, json!({})))));
    settle().await;

    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(!client.first_search_sent());
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(factory.builds().len(), 2);
}

#[test_timeout::tokio_timeout_test]
async fn handlers_see_updated_player_state() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);
    let counts = Arc::new(Mutex::new(Vec::new()));
    let all = Arc::new(Mutex::new(0usize));

    let sink = Arc::clone(&counts);
    client.on(ops::QUEUE_CHANGED, move |_, state| sink.lock().push(state.queue_count));
    let total = Arc::clone(&all);
    client.on(hub::ON_MESSAGE, move |_, _| *total.lock() += 1);

    client.connect_sequence().await;
    factory.push_message(evt(ops::QUEUE_CHANGED, json!({ "queueCount": 3 })));
    factory.push_message(evt(
        ops::SEARCH_RESULT,
        json!({ "searchResult": [{ "songId": 9, "title": "Dancing Queen", "singer": "ABBA" }] }),
    ));
    settle().await;

    assert_eq!(*counts.lock(), vec![3]);
    assert_eq!(*all.lock(), 2);
    let player = client.player_state();
    assert_eq!(player.queue_count, 3);
    assert_eq!(player.search_results[0].title, "Dancing Queen");
}

#[test_timeout::tokio_timeout_test]
async fn non_event_messages_are_ignored() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);
    let hits = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&hits);
    client.on(hub::ON_MESSAGE, move |_, _| *sink.lock() += 1);

    client.connect_sequence().await;
    factory.push_message(Envelope::new(SID, Kind::Cmd, ops::QUEUE_CHANGED, json!({})));
    settle().await;

    assert_eq!(*hits.lock(), 0);
    assert!(!client.first_search_sent());
}

#[test_timeout::tokio_timeout_test]
async fn triggers_only_connect_when_disconnected() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);

    assert_eq!(
        client.handle_trigger(LifecycleTrigger::Boot).await,
        Some(SequenceOutcome::Joined)
    );
    assert_eq!(client.handle_trigger(LifecycleTrigger::PageShow).await, None);
    assert_eq!(client.handle_trigger(LifecycleTrigger::VisibilityChanged(false)).await, None);
    assert_eq!(factory.builds().len(), 1);
}

#[test_timeout::tokio_timeout_test]
async fn dispose_stops_connection() {
    let factory = MockTransportFactory::new();
    let client = client_for(&factory);
    client.connect_sequence().await;

    client.dispose().await;
    assert_eq!(factory.stops(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(client.dispatch(&Command::QueueRemove { position: 1 }), Delivery::Queued(_)));
    assert_eq!(client.connect_sequence().await, SequenceOutcome::Disposed);
}
