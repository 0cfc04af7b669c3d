//! JSON hub protocol framing. Every record on the socket is a JSON object
//! terminated by the ASCII record separator; one WebSocket text frame may carry
//! several records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TransportError;

pub const RECORD_SEPARATOR: char = '\u{1e}';

pub const FRAME_INVOCATION: u8 = 1;
pub const FRAME_STREAM_ITEM: u8 = 2;
pub const FRAME_COMPLETION: u8 = 3;
pub const FRAME_PING: u8 = 6;
pub const FRAME_CLOSE: u8 = 7;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HubFrame {
    #[serde(rename = "type")]
    pub frame_type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_reconnect: Option<bool>,
}

impl HubFrame {
    /// An invocation without an id is fire-and-forget: the hub sends no
    /// completion for it.
    pub fn invocation(invocation_id: Option<String>, target: &str, arguments: Vec<Value>) -> Self {
        Self {
            frame_type: FRAME_INVOCATION,
            invocation_id,
            target: Some(target.to_string()),
            arguments: Some(arguments),
            ..Self::default()
        }
    }

    pub fn ping() -> Self {
        Self {
            frame_type: FRAME_PING,
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

pub fn handshake_request() -> String {
    format!(r#"{{"protocol":"json","version":1}}{RECORD_SEPARATOR}"#)
}

pub fn encode(frame: &HubFrame) -> Result<String, TransportError> {
    let mut text = serde_json::to_string(frame)?;
    text.push(RECORD_SEPARATOR);
    Ok(text)
}

/// Splits a text frame into its non-empty records.
pub fn records(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|record| !record.is_empty())
}

pub fn decode(record: &str) -> Result<HubFrame, TransportError> {
    serde_json::from_str(record).map_err(|err| TransportError::Protocol(err.to_string()))
}

pub fn check_handshake(record: &str) -> Result<(), TransportError> {
    let response: HandshakeResponse =
        serde_json::from_str(record).map_err(|err| TransportError::Handshake(err.to_string()))?;
    match response.error {
        Some(error) => Err(TransportError::Handshake(error)),
        None => Ok(()),
    }
}
