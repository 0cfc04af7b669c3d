use std::fmt;

use serde::{Deserialize, Serialize};

pub const CODE_SESSION_EXPIRED: &str = "SESSION_EXPIRED";
pub const CODE_ROOM_FULL: &str = "ROOM_FULL";

/// Reply to `JoinRemote`. `ok == false` is an ordinary outcome, not a fault.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl JoinResult {
    pub fn accepted() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn rejected(code: impl Into<String>) -> Self {
        Self {
            ok: false,
            code: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn rejection(&self) -> Option<JoinRejection> {
        if self.ok {
            return None;
        }
        Some(match self.code.as_deref() {
            Some(CODE_SESSION_EXPIRED) => JoinRejection::SessionExpired,
            Some(CODE_ROOM_FULL) => JoinRejection::RoomFull {
                used: self.used,
                max: self.max,
            },
            Some(other) => JoinRejection::Other(other.to_string()),
            None => JoinRejection::Other(String::new()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinRejection {
    SessionExpired,
    RoomFull { used: Option<u32>, max: Option<u32> },
    Other(String),
}

impl fmt::Display for JoinRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinRejection::SessionExpired => f.write_str("session expired, scan the QR code again"),
            JoinRejection::RoomFull {
                used: Some(used),
                max: Some(max),
            } => write!(f, "room is full ({used}/{max} remotes connected)"),
            JoinRejection::RoomFull { .. } => f.write_str("room is full"),
            JoinRejection::Other(code) if code.is_empty() => f.write_str("join rejected"),
            JoinRejection::Other(code) => write!(f, "join rejected ({code})"),
        }
    }
}
