use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::datatype::Datatype;
use crate::error::{PanelError, Result};

pub const SUB_PROTOCOL: &str = "v1.tweaklib.sidvind.com";
pub const SOCKET_PATH: &str = "/socket";
pub const INBOUND_MESSAGE_CAP: usize = 1_048_576;

/// Server-assigned variable identifier.
///
/// Kept in the JSON form it arrived in so `update` messages echo it back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Handle {
    Number(u64),
    Text(String),
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl Handle {
    /// Host-side key for this handle. Tagged by JSON form so `5` and `"5"`
    /// stay distinct.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Number(number) => format!("n:{number}"),
            Self::Text(text) => format!("s:{text}"),
        }
    }

    /// Inverse of [`Handle::key`].
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        if let Some(number) = key.strip_prefix("n:") {
            return number.parse().ok().map(Self::Number);
        }
        key.strip_prefix("s:").map(|text| Self::Text(text.to_string()))
    }
}

impl From<&str> for Handle {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u64> for Handle {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "update")]
    Update { handle: Handle, value: Value },
}

/// Inbound envelopes. Entries stay raw so one bad entry cannot reject its
/// whole batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "hello")]
    Hello { vars: Vec<Value> },

    #[serde(rename = "refresh")]
    Refresh { vars: Vec<Value> },
}

#[derive(Debug, Clone)]
pub enum Inbound {
    Server(ServerMessage),
    Unrecognized(String),
}

/// One `hello` entry. Everything except the handle is optional so a
/// descriptor can be merged over a previously seen partial record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VariableDescriptor {
    pub handle: Option<Handle>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub datatype: Option<Datatype>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
    #[serde(default)]
    pub value: Option<Value>,
}

impl VariableDescriptor {
    pub fn from_entry(entry: Value) -> Result<(Handle, Self)> {
        let descriptor: Self = serde_json::from_value(entry)?;
        let handle = descriptor
            .handle
            .clone()
            .ok_or_else(|| PanelError::invalid_entry("hello entry missing handle"))?;
        Ok((handle, descriptor))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValueEntry {
    pub handle: Handle,
    pub value: Value,
}

impl ValueEntry {
    pub fn from_entry(entry: Value) -> Result<Self> {
        serde_json::from_value(entry).map_err(PanelError::from)
    }
}

pub fn update_message(handle: Handle, value: Value) -> ClientMessage {
    ClientMessage::Update { handle, value }
}

pub fn encode_client_message(message: &ClientMessage) -> Result<String> {
    serde_json::to_string(message).map_err(PanelError::from)
}

/// Decodes one inbound text frame.
///
/// A payload that is not a JSON object with a string `type` is malformed.
/// A well-formed message with a `type` nobody handles is returned as
/// [`Inbound::Unrecognized`] rather than an error.
pub fn decode_server_message(payload: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(payload)?;

    let message_type = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| PanelError::invalid_entry("message missing `type`"))?;

    match message_type.as_str() {
        "hello" | "refresh" => Ok(Inbound::Server(serde_json::from_value(value)?)),
        other => Ok(Inbound::Unrecognized(other.to_string())),
    }
}

pub fn socket_url(host: &str) -> String {
    format!("ws://{host}{SOCKET_PATH}")
}
