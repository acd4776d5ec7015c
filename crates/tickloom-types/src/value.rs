use serde::{Deserialize, Serialize};

/// An opaque value plus a monotonic last-writer-wins timestamp.
///
/// `Option<VersionedValue>` is used throughout the codebase to mean "not
/// found" — there is no separate null sentinel on the type itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub value: Vec<u8>,
    pub timestamp: i64,
}

impl VersionedValue {
    pub fn new(value: impl Into<Vec<u8>>, timestamp: i64) -> Self {
        Self {
            value: value.into(),
            timestamp,
        }
    }
}
