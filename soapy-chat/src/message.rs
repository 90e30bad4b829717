use std::sync::Arc;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::RelayError;

/// Events a client may send. Anything that does not parse into one of these
/// is a protocol error and closes the sending connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Join { name: String },
    Message { content: String },
    Image { content: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Message,
    Image,
}

/// One broadcast entry as stored in the history log and replayed to new
/// sessions. `name` is the sender's display name at broadcast time.
///
/// Image content is an opaque encoded payload (usually a base64 data URI);
/// the relay never inspects it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    pub content: Arc<str>,
}

impl HistoryEntry {
    pub fn new(kind: EntryKind, name: impl Into<String>, content: impl Into<Arc<str>>) -> Self {
        Self {
            kind,
            name: name.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    History { messages: Vec<HistoryEntry> },
    Message { name: String, content: Arc<str> },
    Image { name: String, content: Arc<str> },
}

impl From<HistoryEntry> for ServerEvent {
    fn from(entry: HistoryEntry) -> Self {
        let HistoryEntry {
            kind,
            name,
            content,
        } = entry;
        match kind {
            EntryKind::Message => ServerEvent::Message { name, content },
            EntryKind::Image => ServerEvent::Image { name, content },
        }
    }
}

/// Parses one text frame. Unknown `type` tags and missing fields surface as
/// [`RelayError::Protocol`].
pub fn decode<T>(frame: &str) -> Result<T, RelayError>
where
    T: DeserializeOwned,
{
    serde_json::from_str(frame.trim()).map_err(|err| RelayError::Protocol(err.to_string()))
}

pub fn encode<T>(event: &T) -> Result<String, RelayError>
where
    T: Serialize,
{
    serde_json::to_string(event).map_err(RelayError::from)
}
