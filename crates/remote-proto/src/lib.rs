//! Wire definitions shared by the karaoke remote and its media host.
//! Everything exchanged over the hub is wrapped in an [`Envelope`]; the typed
//! helpers in [`command`] and [`event`] sit on top of that shape so callers
//! never have to hand-build `op`/`data` pairs.

pub mod command;
pub mod event;
pub mod join;
pub mod song;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use command::{Command, SongChoice};
pub use event::{InboundEvent, PlayerSnapshot};
pub use join::{JoinRejection, JoinResult};
pub use song::{Song, SongId};

pub const PROTOCOL_VERSION: u32 = 1;

/// Hub method names and the inbound channel.
pub mod hub {
    pub const ON_MESSAGE: &str = "OnMessage";
    pub const SEND_FROM_REMOTE: &str = "SendFromRemote";
    pub const JOIN_REMOTE: &str = "JoinRemote";
}

/// Operation names carried in [`Envelope::op`].
pub mod ops {
    pub const SEARCH: &str = "search";
    pub const SEARCH_SUGGEST: &str = "search_suggest";
    pub const RESERVE: &str = "res";
    pub const RESERVE_FIRST: &str = "res_1st";
    pub const QUEUE_MOVE_FIRST: &str = "queue_move_first";
    pub const QUEUE_MOVE_UP: &str = "queue_move_up";
    pub const QUEUE_REMOVE: &str = "queue_remove";

    pub const SEARCH_RESULT: &str = "search_result";
    pub const QUEUE_CHANGED: &str = "queue_changed";
    pub const STATE_SNAPSHOT: &str = "state_snapshot";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Cmd,
    Query,
    Evt,
}

impl Kind {
    /// Search style operations expect a reply; everything else is fire-and-forget.
    pub fn for_op(op: &str) -> Self {
        match op {
            ops::SEARCH | ops::SEARCH_SUGGEST => Kind::Query,
            _ => Kind::Cmd,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Cmd => "cmd",
            Kind::Query => "query",
            Kind::Evt => "evt",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub v: u32,
    pub sid: String,
    pub rid: String,
    pub kind: Kind,
    pub op: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Builds an outbound envelope with a fresh request id.
    pub fn new(sid: impl Into<String>, kind: Kind, op: impl Into<String>, data: Value) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            sid: sid.into(),
            rid: Uuid::new_v4().to_string(),
            kind,
            op: op.into(),
            data,
        }
    }

    pub fn from_command(sid: impl Into<String>, command: &Command) -> Self {
        Self::new(sid, command.kind(), command.op(), command.data())
    }

    pub fn is_event(&self) -> bool {
        self.kind == Kind::Evt
    }
}
