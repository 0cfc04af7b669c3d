use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Host-assigned song identifier. Hosts send either numbers or strings, so the
/// raw JSON value is kept and echoed back untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SongId(pub Value);

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(raw) => f.write_str(raw),
            Value::Null => f.write_str("-"),
            other => write!(f, "{other}"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    #[serde(default)]
    pub song_id: SongId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub singer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.singer.is_empty() {
            f.write_str(&self.title)
        } else {
            write!(f, "{} - {}", self.title, self.singer)
        }
    }
}
