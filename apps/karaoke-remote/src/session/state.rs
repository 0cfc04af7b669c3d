use std::fmt;

use remote_proto::{InboundEvent, PlayerSnapshot, Song};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known host player state. Times are milliseconds; `-1` means the host
/// has not reported a value yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub is_playing: bool,
    pub current_audio_track: i32,
    pub current_position_ms: i64,
    pub duration_ms: i64,
    pub current_song: Option<Song>,
    pub queue: Vec<Song>,
    pub queue_count: u32,
    pub search_results: Vec<Song>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_audio_track: 0,
            current_position_ms: -1,
            duration_ms: -1,
            current_song: None,
            queue: Vec::new(),
            queue_count: 0,
            search_results: Vec::new(),
        }
    }
}

impl PlayerState {
    pub fn apply(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::SearchResult(songs) => self.search_results = songs,
            InboundEvent::QueueChanged(snapshot) | InboundEvent::StateSnapshot(snapshot) => {
                self.apply_snapshot(snapshot)
            }
            InboundEvent::Other(_) => {}
        }
    }

    /// Fields missing from the snapshot keep their previous value.
    pub fn apply_snapshot(&mut self, snapshot: PlayerSnapshot) {
        if let Some(queue) = snapshot.queue {
            if snapshot.queue_count.is_none() {
                self.queue_count = u32::try_from(queue.len()).unwrap_or(u32::MAX);
            }
            self.queue = queue;
        }
        if let Some(count) = snapshot.queue_count {
            self.queue_count = count;
        }
        if let Some(song) = snapshot.current_song {
            self.current_song = song;
        }
        if let Some(playing) = snapshot.is_playing {
            self.is_playing = playing;
        }
        if let Some(track) = snapshot.current_audio_track {
            self.current_audio_track = track;
        }
        if let Some(position) = snapshot.current_position_ms {
            self.current_position_ms = position;
        }
        if let Some(duration) = snapshot.duration_ms {
            self.duration_ms = duration;
        }
    }

    /// Playback progress in `0.0..=1.0`, when both position and duration are known.
    pub fn progress(&self) -> Option<f64> {
        if self.duration_ms <= 0 || self.current_position_ms < 0 {
            return None;
        }
        Some((self.current_position_ms as f64 / self.duration_ms as f64).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_proto::SongId;
    use serde_json::json;

    fn song(title: &str) -> Song {
        Song {
            song_id: SongId(json!(title)),
            title: title.into(),
            singer: "Someone".into(),
            ..Song::default()
        }
    }

    #[test]
    fn defaults_report_unknown_times() {
        let state = PlayerState::default();
        assert_eq!(state.current_position_ms, -1);
        assert_eq!(state.duration_ms, -1);
        assert_eq!(state.progress(), None);
    }

    #[test]
    fn partial_snapshot_keeps_other_fields() {
        let mut state = PlayerState::default();
        state.apply_snapshot(PlayerSnapshot {
            queue: Some(vec![song("a"), song("b")]),
            current_song: Some(Some(song("now"))),
            is_playing: Some(true),
            current_position_ms: Some(30_000),
            duration_ms: Some(120_000),
            ..PlayerSnapshot::default()
        });
        assert_eq!(state.queue_count, 2);
        assert_eq!(state.progress(), Some(0.25));

        state.apply_snapshot(PlayerSnapshot {
            queue_count: Some(5),
            ..PlayerSnapshot::default()
        });
        assert_eq!(state.queue_count, 5);
        assert_eq!(state.queue.len(), 2);
        assert_eq!(state.current_song.as_ref().map(|s| s.title.as_str()), Some("now"));

        state.apply_snapshot(PlayerSnapshot {
            current_song: Some(None),
            ..PlayerSnapshot::default()
        });
        assert!(state.current_song.is_none());
        assert!(state.is_playing);
    }

    #[test]
    fn search_results_replace_previous() {
        let mut state = PlayerState::default();
        state.apply(InboundEvent::SearchResult(vec![song("x")]));
        state.apply(InboundEvent::SearchResult(vec![song("y"), song("z")]));
        assert_eq!(state.search_results.len(), 2);
        assert_eq!(state.search_results[0].title, "y");
    }
}
