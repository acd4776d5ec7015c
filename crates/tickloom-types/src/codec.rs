use serde::{de::DeserializeOwned, Serialize};

use crate::TickLoomError;

/// (De)serializes message payloads.
///
/// Implementations must be deterministic and self-describing for every
/// payload type in `tickloom_types::payloads` — the quorum replica relies
/// on byte-identical encodings for the determinism property in `spec.md`
/// §8 (property 6).
pub trait Codec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, TickLoomError>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, TickLoomError>;
}

/// The default codec: JSON via `serde_json`.
///
/// JSON is human-inspectable in captured traces, which matters more than
/// wire compactness for a simulation-first substrate.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, TickLoomError> {
        serde_json::to_vec(value).map_err(|e| TickLoomError::MalformedMessage(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, TickLoomError> {
        serde_json::from_slice(bytes).map_err(|e| TickLoomError::MalformedMessage(e.to_string()))
    }
}
