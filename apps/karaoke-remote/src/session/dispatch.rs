use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use remote_proto::{Envelope, hub};

use super::state::PlayerState;

pub type EventHandler = Arc<dyn Fn(&Envelope, &PlayerState) + Send + Sync>;

/// Handlers keyed by op. Handlers registered under [`hub::ON_MESSAGE`] see
/// every inbound event.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl HandlerRegistry {
    pub fn register(&self, name: impl Into<String>, handler: EventHandler) {
        self.handlers
            .write()
            .entry(name.into())
            .or_default()
            .push(handler);
    }

    pub fn count(&self, name: &str) -> usize {
        self.handlers.read().get(name).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().values().all(Vec::is_empty)
    }

    /// Runs channel-wide handlers, then the op's handlers, each in
    /// registration order. Returns how many ran.
    pub fn dispatch(&self, envelope: &Envelope, state: &PlayerState) -> usize {
        let selected: Vec<EventHandler> = {
            let handlers = self.handlers.read();
            let wide = handlers.get(hub::ON_MESSAGE).into_iter().flatten();
            let specific = handlers.get(envelope.op.as_str()).into_iter().flatten();
            wide.chain(specific).cloned().collect()
        };
        for handler in &selected {
            handler(envelope, state);
        }
        selected.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use remote_proto::{Kind, ops};
    use serde_json::json;

    #[test]
    fn routes_by_op_after_channel_handlers() {
        let registry = HandlerRegistry::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["wide-1", "wide-2"] {
            let seen = Arc::clone(&seen);
            registry.register(
                hub::ON_MESSAGE,
                Arc::new(move |_: &Envelope, _: &PlayerState| seen.lock().push(label)),
            );
        }
        let log = Arc::clone(&seen);
        registry.register(
            ops::QUEUE_CHANGED,
            Arc::new(move |_: &Envelope, _: &PlayerState| log.lock().push("queue")),
        );

        let envelope = Envelope::new("s", Kind::Evt, ops::QUEUE_CHANGED, json!({}));
        assert_eq!(registry.dispatch(&envelope, &PlayerState::default()), 3);
        assert_eq!(*seen.lock(), vec!["wide-1", "wide-2", "queue"]);

        let other = Envelope::new("s", Kind::Evt, ops::SEARCH_RESULT, json!({}));
        assert_eq!(registry.dispatch(&other, &PlayerState::default()), 2);
        assert_eq!(registry.count(ops::SEARCH_RESULT), 0);
    }

    #[test]
    fn handlers_may_register_more_handlers() {
        let registry = Arc::new(HandlerRegistry::default());
        let inner = Arc::clone(&registry);
        registry.register(
            hub::ON_MESSAGE,
            Arc::new(move |_: &Envelope, _: &PlayerState| {
                inner.register("late", Arc::new(|_: &Envelope, _: &PlayerState| {}));
            }),
        );
        let envelope = Envelope::new("s", Kind::Evt, "anything", json!(null));
        registry.dispatch(&envelope, &PlayerState::default());
        assert_eq!(registry.count("late"), 1);
    }
}
