use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use remote_proto::{Song, ops};

use super::format::now_playing;
use crate::session::{ConnectionState, PlayerState, SessionClient, SessionEvent};

/// Line-oriented renderer for search results, the queue and connection status.
pub struct TerminalView {
    out: Mutex<Box<dyn Write + Send>>,
}

impl TerminalView {
    pub fn new(out: Box<dyn Write + Send>) -> Arc<Self> {
        Arc::new(Self {
            out: Mutex::new(out),
        })
    }

    pub fn stdout() -> Arc<Self> {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Registers render callbacks. Call before the first connect sequence.
    pub fn attach(self: &Arc<Self>, client: &SessionClient) {
        let view = Arc::clone(self);
        client.on(ops::SEARCH_RESULT, move |_, state| {
            view.render_search(&state.search_results)
        });
        for op in [ops::QUEUE_CHANGED, ops::STATE_SNAPSHOT] {
            let view = Arc::clone(self);
            client.on(op, move |_, state| view.render_player(state));
        }
        let view = Arc::clone(self);
        client.on_status(move |event| view.render_status(event));
    }

    pub fn line(&self, text: &str) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }

    pub fn render_search(&self, songs: &[Song]) {
        if songs.is_empty() {
            self.line("no results");
            return;
        }
        let mut text = format!("results ({}):", songs.len());
        for (index, song) in songs.iter().enumerate() {
            text.push_str(&format!("\n  {:>2}. {song}", index + 1));
        }
        self.line(&text);
    }

    pub fn render_player(&self, state: &PlayerState) {
        let mut text = now_playing(state);
        text.push_str(&format!("\nqueue ({}):", state.queue_count));
        if state.queue.is_empty() {
            text.push_str(" empty");
        }
        for (index, song) in state.queue.iter().enumerate() {
            text.push_str(&format!("\n  {:>2}. {song}", index + 1));
        }
        self.line(&text);
    }

    pub fn render_status(&self, event: &SessionEvent) {
        let text = match event {
            SessionEvent::State(ConnectionState::Connecting) => "… connecting".to_string(),
            SessionEvent::State(ConnectionState::Connected) => "● connected".to_string(),
            SessionEvent::State(ConnectionState::Reconnecting) => "↻ connection lost, reconnecting".to_string(),
            SessionEvent::State(ConnectionState::Disconnected) => "○ disconnected".to_string(),
            SessionEvent::Joined => "✓ joined session".to_string(),
            SessionEvent::JoinRejected { rejection, .. } => format!("✗ {rejection}"),
            SessionEvent::ConnectFailed(reason) => format!("✗ {reason}; retrying shortly"),
        };
        self.line(&text);
    }
}
