use serde::{Deserialize, Serialize};

use crate::process_id::ProcessId;

/// The role a process plays with respect to a given message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerType {
    Client,
    Server,
    Replica,
    Unknown,
}

/// A non-empty string tag identifying a message's handler. Equality is by
/// the wrapped string, same as `spec.md`'s data model requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageType(String);

impl MessageType {
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        debug_assert!(!tag.is_empty(), "message type tag must not be empty");
        Self(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The envelope every component in the substrate routes.
///
/// `correlation_id` is optional for handshake-style types but present on
/// every request/response pair — `Process`/`RequestWaitingList` rely on it
/// being `Some` whenever a reply needs to be routed back to a pending
/// callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub source: ProcessId,
    pub destination: ProcessId,
    pub peer_type: PeerType,
    pub message_type: MessageType,
    pub payload: Vec<u8>,
    pub correlation_id: Option<String>,
}

impl Message {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: ProcessId,
        destination: ProcessId,
        peer_type: PeerType,
        message_type: impl Into<MessageType>,
        payload: Vec<u8>,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            source,
            destination,
            peer_type,
            message_type: message_type.into(),
            payload,
            correlation_id,
        }
    }
}
