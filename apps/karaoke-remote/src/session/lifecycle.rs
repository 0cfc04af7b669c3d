use std::sync::atomic::{AtomicBool, Ordering};

use remote_proto::JoinResult;

/// Page-level signals that may (re)start the connect sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTrigger {
    Boot,
    VisibilityChanged(bool),
    Online,
    PageShow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SequenceOutcome {
    Joined,
    Rejected(JoinResult),
    JoinFailed(String),
    ConnectFailed(String),
    /// Another sequence was already in flight; nothing was done.
    AlreadyRunning,
    Disposed,
}

/// Holds the single-flight flag for the duration of a connect sequence.
pub(crate) struct SequenceGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SequenceGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
