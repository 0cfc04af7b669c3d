use serde::Deserialize;

use crate::song::Song;
use crate::{Envelope, ops};

/// Player fields pushed with `queue_changed` and `state_snapshot`. Hosts may
/// send partial updates, so every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    #[serde(default)]
    pub queue: Option<Vec<Song>>,
    #[serde(default)]
    pub queue_count: Option<u32>,
    #[serde(default, deserialize_with = "present")]
    pub current_song: Option<Option<Song>>,
    #[serde(default)]
    pub is_playing: Option<bool>,
    #[serde(default)]
    pub current_audio_track: Option<i32>,
    #[serde(default)]
    pub current_position_ms: Option<i64>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

// Distinguishes `"currentSong": null` (nothing playing) from a missing key.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<Song>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<Song>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultPayload {
    #[serde(default)]
    search_result: Vec<Song>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    SearchResult(Vec<Song>),
    QueueChanged(PlayerSnapshot),
    StateSnapshot(PlayerSnapshot),
    Other(String),
}

impl InboundEvent {
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, serde_json::Error> {
        let data = if envelope.data.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            envelope.data.clone()
        };
        match envelope.op.as_str() {
            ops::SEARCH_RESULT => {
                let payload: SearchResultPayload = serde_json::from_value(data)?;
                Ok(InboundEvent::SearchResult(payload.search_result))
            }
            ops::QUEUE_CHANGED => Ok(InboundEvent::QueueChanged(serde_json::from_value(data)?)),
            ops::STATE_SNAPSHOT => Ok(InboundEvent::StateSnapshot(serde_json::from_value(data)?)),
            other => Ok(InboundEvent::Other(other.to_string())),
        }
    }
}
