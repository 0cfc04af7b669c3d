use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use remote_proto::Command;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::session::SessionClient;

pub const SUGGEST_DEBOUNCE: Duration = Duration::from_millis(220);
pub const DEFAULT_SUGGEST_LIMIT: u32 = 8;

/// Turns keystrokes into at most one `search_suggest` per quiet window.
/// Each keystroke cancels the pending request; an empty field sends nothing.
pub struct SuggestDebouncer {
    client: Arc<SessionClient>,
    window: Duration,
    limit: u32,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl SuggestDebouncer {
    pub fn new(client: Arc<SessionClient>, window: Duration, limit: u32) -> Self {
        Self {
            client,
            window,
            limit,
            pending: Mutex::new(None),
        }
    }

    pub fn keystroke(&self, text: &str) {
        self.cancel();
        if text.trim().is_empty() {
            return;
        }
        let query = text.to_string();
        let client = Arc::clone(&self.client);
        let window = self.window;
        let limit = self.limit;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            trace!(target: "karaoke::suggest", %query, "sending suggestion query");
            client.dispatch(&Command::Suggest { q: query, limit });
        });
        *self.pending.lock() = Some(handle);
    }

    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for SuggestDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
