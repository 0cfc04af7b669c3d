use std::collections::{HashSet, VecDeque};

use remote_proto::Envelope;

/// Limits applied while messages wait for a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Once this many messages are waiting, newer ones are dropped.
    pub capacity: Option<usize>,
    /// Ops for which only the latest queued message matters.
    pub coalesce_ops: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// Replaced `replaced` earlier messages with the same op.
    Coalesced { replaced: usize },
    Dropped,
}

#[derive(Default, Debug, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub drops: usize,
    pub coalesced: usize,
}

/// FIFO of envelopes produced while the session is not connected.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<Envelope>,
    policy: QueuePolicy,
    drops: usize,
    coalesced: usize,
}

impl OutboundQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            items: VecDeque::new(),
            policy,
            drops: 0,
            coalesced: 0,
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.items.len(),
            drops: self.drops,
            coalesced: self.coalesced,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Envelope> {
        self.items.iter().cloned().collect()
    }

    pub fn push(&mut self, envelope: Envelope) -> Enqueued {
        let mut replaced = 0;
        if self.policy.coalesce_ops.contains(&envelope.op) {
            let before = self.items.len();
            self.items.retain(|queued| queued.op != envelope.op);
            replaced = before - self.items.len();
            self.coalesced += replaced;
        }

        if let Some(capacity) = self.policy.capacity {
            if self.items.len() >= capacity {
                self.drops += 1;
                return Enqueued::Dropped;
            }
        }
        self.items.push_back(envelope);
        if replaced > 0 {
            Enqueued::Coalesced { replaced }
        } else {
            Enqueued::Queued
        }
    }

    /// Detaches every waiting message in enqueue order, leaving the queue
    /// empty before the caller starts sending.
    pub fn take_all(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.items).into()
    }
}
