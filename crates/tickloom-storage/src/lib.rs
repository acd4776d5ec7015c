//! # tickloom-storage: the tick-delayed async storage contract
//!
//! One trait ([`Storage`]), one simulated implementation ([`SimStorage`])
//! with configurable delay and failure injection, and — behind the
//! `persistent` feature — a [`sled_storage::SledStorage`] sketch
//! satisfying the same contract over an on-disk database. `spec.md` §1
//! scopes the real persistent backend out beyond its interface; the
//! `persistent` feature exists to demonstrate the seam, not to ship a
//! hardened engine.

mod storage;

#[cfg(feature = "persistent")]
mod sled_storage;

pub use storage::{PendingOpKind, SimStorage, SimStorageConfig, Storage};

#[cfg(feature = "persistent")]
pub use sled_storage::SledStorage;
