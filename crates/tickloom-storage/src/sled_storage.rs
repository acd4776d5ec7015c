//! A persistent `Storage` sketch over `sled`, gated behind the
//! `persistent` feature.
//!
//! `spec.md` §1 scopes the real on-disk backend out of the core as "one
//! implementation of the Storage contract" — this shows the seam exists
//! and is pluggable, it is not a hardened production engine (no
//! compaction tuning, no encryption, no crash-consistency testing beyond
//! what `sled` itself provides).

use tickloom_runtime::ListenableFuture;
use tickloom_types::{TickLoomError, VersionedValue};

use crate::storage::Storage;

/// Wire format for the value sled stores under each key: the versioned
/// value's bytes plus its LWW timestamp, JSON-encoded for the same
/// "self-describing" reason `tickloom-types::JsonCodec` is the default
/// wire codec.
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredRecord {
    value: Vec<u8>,
    timestamp: i64,
}

impl From<VersionedValue> for StoredRecord {
    fn from(v: VersionedValue) -> Self {
        Self {
            value: v.value,
            timestamp: v.timestamp,
        }
    }
}

impl From<StoredRecord> for VersionedValue {
    fn from(r: StoredRecord) -> Self {
        VersionedValue::new(r.value, r.timestamp)
    }
}

/// Completion still flows through `tick()`, same as `SimStorage` — a real
/// deployment still wants the driver thread to be the only place a
/// `ListenableFuture` ever resolves, even though the underlying `sled`
/// call here is synchronous. Operations complete on the very next
/// `tick()` rather than being tick-delayed by a configurable amount; a
/// production backend would size this queue against actual disk
/// latency.
pub struct SledStorage {
    db: sled::Db,
    ready: Vec<(Option<VersionedValue>, ListenableFuture<Option<VersionedValue>>)>,
    ready_sets: Vec<(bool, ListenableFuture<bool>)>,
}

impl SledStorage {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, TickLoomError> {
        let db = sled::open(path).map_err(|e| TickLoomError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            db,
            ready: Vec::new(),
            ready_sets: Vec::new(),
        })
    }

    fn read(&self, key: &[u8]) -> Result<Option<VersionedValue>, TickLoomError> {
        match self.db.get(key) {
            Ok(Some(bytes)) => {
                let record: StoredRecord = serde_json::from_slice(&bytes)
                    .map_err(|e| TickLoomError::MalformedMessage(e.to_string()))?;
                Ok(Some(record.into()))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, "sled storage: read failed");
                Err(TickLoomError::StorageFailure)
            }
        }
    }
}

impl Storage for SledStorage {
    fn get(&mut self, key: Vec<u8>) -> ListenableFuture<Option<VersionedValue>> {
        let future = ListenableFuture::new();
        let value = self.read(&key).unwrap_or(None);
        self.ready.push((value, future.clone()));
        future
    }

    fn set(&mut self, key: Vec<u8>, value: VersionedValue) -> ListenableFuture<bool> {
        let future = ListenableFuture::new();
        let should_write = match self.read(&key) {
            Ok(Some(existing)) => existing.timestamp < value.timestamp,
            Ok(None) => true,
            Err(_) => true,
        };
        if should_write {
            let record: StoredRecord = value.into();
            let encoded = match serde_json::to_vec(&record) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "sled storage: failed to encode record");
                    self.ready_sets.push((false, future.clone()));
                    return future;
                }
            };
            if let Err(e) = self.db.insert(key, encoded) {
                tracing::warn!(error = %e, "sled storage: insert failed");
                self.ready_sets.push((false, future.clone()));
                return future;
            }
        }
        self.ready_sets.push((true, future.clone()));
        future
    }

    fn tick(&mut self) {
        for (value, future) in self.ready.drain(..) {
            future.complete(value);
        }
        for (success, future) in self.ready_sets.drain(..) {
            future.complete(success);
        }
    }

    fn close(&mut self) {
        for (_, future) in self.ready.drain(..) {
            future.fail(TickLoomError::Shutdown);
        }
        for (_, future) in self.ready_sets.drain(..) {
            future.fail(TickLoomError::Shutdown);
        }
        let _ = self.db.flush();
    }
}
