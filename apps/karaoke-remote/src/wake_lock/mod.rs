//! Keeps the device awake while the remote is in front of the user. The
//! platform may drop a lock on its own; the guard re-requests it only while
//! the page is visible.

mod inhibit;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace, warn};

pub use inhibit::InhibitWakeLock;

#[derive(Debug, Error)]
pub enum WakeLockError {
    #[error("wake lock unsupported: {0}")]
    Unsupported(String),
    #[error("wake lock request denied: {0}")]
    Denied(String),
    #[error("wake lock io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lets a provider report that the platform released a lock it granted.
#[derive(Debug, Clone)]
pub struct ReleaseNotifier {
    epoch: u64,
    tx: mpsc::UnboundedSender<u64>,
}

impl ReleaseNotifier {
    pub fn notify(&self) {
        let _ = self.tx.send(self.epoch);
    }
}

/// A granted lock. Dropping it without `release` leaves cleanup to the provider.
pub trait WakeLockSentinel: Send {
    fn release(self: Box<Self>);
}

#[async_trait]
pub trait WakeLockProvider: Send + Sync {
    async fn request(&self, released: ReleaseNotifier)
        -> Result<Box<dyn WakeLockSentinel>, WakeLockError>;
}

/// Provider for platforms without a wake lock facility.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWakeLock;

struct NoopSentinel;

impl WakeLockSentinel for NoopSentinel {
    fn release(self: Box<Self>) {}
}

#[async_trait]
impl WakeLockProvider for NoWakeLock {
    async fn request(
        &self,
        _released: ReleaseNotifier,
    ) -> Result<Box<dyn WakeLockSentinel>, WakeLockError> {
        Ok(Box::new(NoopSentinel))
    }
}

struct Held {
    epoch: u64,
    sentinel: Box<dyn WakeLockSentinel>,
}

pub struct WakeLockGuard {
    provider: Arc<dyn WakeLockProvider>,
    held: Mutex<Option<Held>>,
    visible: AtomicBool,
    next_epoch: AtomicU64,
    release_tx: mpsc::UnboundedSender<u64>,
}

impl WakeLockGuard {
    /// Must be called inside a Tokio runtime; spawns the release listener.
    pub fn new(provider: Arc<dyn WakeLockProvider>) -> Arc<Self> {
        let (release_tx, release_rx) = mpsc::unbounded_channel();
        let guard = Arc::new(Self {
            provider,
            held: Mutex::new(None),
            visible: AtomicBool::new(true),
            next_epoch: AtomicU64::new(0),
            release_tx,
        });
        tokio::spawn(listen_for_releases(Arc::downgrade(&guard), release_rx));
        guard
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    pub async fn is_held(&self) -> bool {
        self.held.lock().await.is_some()
    }

    /// Requests the lock unless it is already held or the page is hidden.
    /// Failures are logged (silently while hidden) and reported as `false`.
    pub async fn acquire(&self) -> bool {
        if !self.is_visible() {
            return false;
        }
        let mut held = self.held.lock().await;
        if held.is_some() {
            return true;
        }
        let epoch = self.next_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let notifier = ReleaseNotifier {
            epoch,
            tx: self.release_tx.clone(),
        };
        match self.provider.request(notifier).await {
            Ok(sentinel) => {
                debug!(target: "karaoke::wake_lock", epoch, "wake lock acquired");
                *held = Some(Held { epoch, sentinel });
                true
            }
            Err(err) => {
                if self.is_visible() {
                    warn!(target: "karaoke::wake_lock", error = %err, "wake lock request failed");
                } else {
                    trace!(target: "karaoke::wake_lock", error = %err, "wake lock request failed while hidden");
                }
                false
            }
        }
    }

    pub async fn release(&self) {
        let held = self.held.lock().await.take();
        if let Some(held) = held {
            debug!(target: "karaoke::wake_lock", epoch = held.epoch, "wake lock released");
            held.sentinel.release();
        }
    }

    pub async fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Release);
        if visible {
            self.acquire().await;
        } else {
            self.release().await;
        }
    }

    async fn platform_released(&self, epoch: u64) {
        {
            let mut held = self.held.lock().await;
            if held.as_ref().map(|current| current.epoch) != Some(epoch) {
                return;
            }
            held.take();
        }
        debug!(target: "karaoke::wake_lock", epoch, "platform released wake lock");
        if self.is_visible() {
            self.acquire().await;
        }
    }
}

async fn listen_for_releases(guard: Weak<WakeLockGuard>, mut releases: mpsc::UnboundedReceiver<u64>) {
    while let Some(epoch) = releases.recv().await {
        let Some(guard) = guard.upgrade() else {
            break;
        };
        guard.platform_released(epoch).await;
    }
}
