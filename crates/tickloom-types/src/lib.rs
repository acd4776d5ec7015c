//! # tickloom-types: core wire and data types for `TickLoom`
//!
//! This crate contains the types shared across the whole simulation
//! substrate: process identity ([`ProcessId`]), the envelope every
//! component routes ([`Message`]), last-writer-wins values
//! ([`VersionedValue`]), and the [`Codec`] seam used to (de)serialize
//! message payloads.
//!
//! Nothing here ticks, sends, or stores anything — these are plain data
//! types plus the error enum every other crate propagates.

mod codec;
mod error;
mod message;
mod process_id;
mod value;

pub use codec::{Codec, JsonCodec};
pub use error::TickLoomError;
pub use message::{Message, MessageType, PeerType};
pub use process_id::ProcessId;
pub use value::VersionedValue;

/// String tags for the message types named in the wire protocol table.
pub mod message_types {
    pub const CLIENT_GET_REQUEST: &str = "CLIENT_GET_REQUEST";
    pub const CLIENT_GET_RESPONSE: &str = "CLIENT_GET_RESPONSE";
    pub const CLIENT_SET_REQUEST: &str = "CLIENT_SET_REQUEST";
    pub const CLIENT_SET_RESPONSE: &str = "CLIENT_SET_RESPONSE";
    pub const INTERNAL_GET_REQUEST: &str = "INTERNAL_GET_REQUEST";
    pub const INTERNAL_GET_RESPONSE: &str = "INTERNAL_GET_RESPONSE";
    pub const INTERNAL_SET_REQUEST: &str = "INTERNAL_SET_REQUEST";
    pub const INTERNAL_SET_RESPONSE: &str = "INTERNAL_SET_RESPONSE";
}

/// Payload schemas for the message types in the wire protocol table.
pub mod payloads {
    use serde::{Deserialize, Serialize};

    use crate::VersionedValue;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ClientGetRequest {
        pub key: Vec<u8>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ClientGetResponse {
        pub key: Vec<u8>,
        pub value: Option<Vec<u8>>,
        pub found: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ClientSetRequest {
        pub key: Vec<u8>,
        pub value: Vec<u8>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ClientSetResponse {
        pub key: Vec<u8>,
        pub success: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct InternalGetRequest {
        pub key: Vec<u8>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct InternalGetResponse {
        pub key: Vec<u8>,
        pub value: Option<VersionedValue>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct InternalSetRequest {
        pub key: Vec<u8>,
        pub value: Vec<u8>,
        pub timestamp: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct InternalSetResponse {
        pub key: Vec<u8>,
        pub success: bool,
    }
}
