use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::song::{Song, SongId};
use crate::{Kind, ops};

/// Payload of `res` / `res_1st`: the search hit the user picked.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SongChoice {
    pub youtube_id: Option<String>,
    pub song_id: SongId,
    pub title: String,
    pub singer: String,
    pub thumbnail: Option<String>,
}

impl From<&Song> for SongChoice {
    fn from(song: &Song) -> Self {
        Self {
            youtube_id: song.youtube_id.clone(),
            song_id: song.song_id.clone(),
            title: song.title.clone(),
            singer: song.singer.clone(),
            thumbnail: song.thumbnail.clone(),
        }
    }
}

/// Outbound user intents.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Search { keyword: String },
    Suggest { q: String, limit: u32 },
    Reserve(SongChoice),
    ReserveFirst(SongChoice),
    QueueMoveFirst { position: u32 },
    QueueMoveUp { position: u32 },
    QueueRemove { position: u32 },
}

impl Command {
    pub fn op(&self) -> &'static str {
        match self {
            Command::Search { .. } => ops::SEARCH,
            Command::Suggest { .. } => ops::SEARCH_SUGGEST,
            Command::Reserve(_) => ops::RESERVE,
            Command::ReserveFirst(_) => ops::RESERVE_FIRST,
            Command::QueueMoveFirst { .. } => ops::QUEUE_MOVE_FIRST,
            Command::QueueMoveUp { .. } => ops::QUEUE_MOVE_UP,
            Command::QueueRemove { .. } => ops::QUEUE_REMOVE,
        }
    }

    pub fn kind(&self) -> Kind {
        Kind::for_op(self.op())
    }

    pub fn data(&self) -> Value {
        match self {
            Command::Search { keyword } => json!({ "keyword": keyword }),
            Command::Suggest { q, limit } => json!({ "q": q, "limit": limit }),
            Command::Reserve(choice) | Command::ReserveFirst(choice) => {
                serde_json::to_value(choice).unwrap_or(Value::Null)
            }
            Command::QueueMoveFirst { position }
            | Command::QueueMoveUp { position }
            | Command::QueueRemove { position } => json!({ "position": position }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_payload_uses_wire_names() {
        let song = Song {
            song_id: SongId(json!(7)),
            youtube_id: Some("yt-7".into()),
            title: "My Way".into(),
            singer: "Frank".into(),
            thumbnail: None,
        };
        let command = Command::ReserveFirst(SongChoice::from(&song));
        assert_eq!(command.op(), "res_1st");
        assert_eq!(command.kind(), Kind::Cmd);
        let data = command.data();
        assert_eq!(data["youtubeId"], "yt-7");
        assert_eq!(data["songId"], 7);
        assert_eq!(data["title"], "My Way");
        assert_eq!(data["singer"], "Frank");
        assert!(data["thumbnail"].is_null());
    }

    #[test]
    fn queue_commands_carry_position() {
        for (command, op) in [
            (Command::QueueMoveFirst { position: 3 }, "queue_move_first"),
            (Command::QueueMoveUp { position: 3 }, "queue_move_up"),
            (Command::QueueRemove { position: 3 }, "queue_remove"),
        ] {
            assert_eq!(command.op(), op);
            assert_eq!(command.data(), json!({ "position": 3 }));
        }
    }

    #[test]
    fn suggest_is_a_query() {
        let command = Command::Suggest { q: "bohem".into(), limit: 8 };
        assert_eq!(command.kind(), Kind::Query);
        assert_eq!(command.data(), json!({ "q": "bohem", "limit": 8 }));
    }
}
