//! `BuggyStorage` — a test-only `Storage` that can be told to violate
//! the monotone-write policy on demand. Exists purely so the property
//! test for idempotent LWW acknowledgement (`spec.md` §8 property 2)
//! has something to fail against; a property test with no way to
//! observe a red run is not evidence of anything.
//!
//! Test-only scaffolding: not part of the shipped crate surface.
#![cfg(test)]

use std::cell::Cell;
use std::collections::HashMap;

use tickloom_runtime::ListenableFuture;
use tickloom_storage::Storage;
use tickloom_types::VersionedValue;

/// A bare, zero-delay key/value store: `get`/`set` resolve on the very
/// next `tick()`. `set` honors the monotone-write policy unless
/// `violate_monotone_write` has been switched on, in which case it
/// always overwrites — the one knob this exists to provide.
#[derive(Default)]
pub struct BuggyStorage {
    data: HashMap<Vec<u8>, VersionedValue>,
    ready_gets: Vec<(Option<VersionedValue>, ListenableFuture<Option<VersionedValue>>)>,
    ready_sets: Vec<(bool, ListenableFuture<bool>)>,
    violate_monotone_write: Cell<bool>,
}

impl BuggyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_violate_monotone_write(&self, violate: bool) {
        self.violate_monotone_write.set(violate);
    }

    pub fn peek(&self, key: &[u8]) -> Option<&VersionedValue> {
        self.data.get(key)
    }
}

impl Storage for BuggyStorage {
    fn get(&mut self, key: Vec<u8>) -> ListenableFuture<Option<VersionedValue>> {
        let future = ListenableFuture::new();
        let value = self.data.get(&key).cloned();
        self.ready_gets.push((value, future.clone()));
        future
    }

    fn set(&mut self, key: Vec<u8>, value: VersionedValue) -> ListenableFuture<bool> {
        let future = ListenableFuture::new();
        let should_write = self.violate_monotone_write.get()
            || match self.data.get(&key) {
                Some(existing) => existing.timestamp < value.timestamp,
                None => true,
            };
        if should_write {
            self.data.insert(key, value);
        }
        self.ready_sets.push((true, future.clone()));
        future
    }

    fn tick(&mut self) {
        for (value, future) in self.ready_gets.drain(..) {
            future.complete(value);
        }
        for (success, future) in self.ready_sets.drain(..) {
            future.complete(success);
        }
    }

    fn close(&mut self) {
        for (_, future) in self.ready_gets.drain(..) {
            future.fail(tickloom_types::TickLoomError::Shutdown);
        }
        for (_, future) in self.ready_sets.drain(..) {
            future.fail(tickloom_types::TickLoomError::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sound_mode_honors_monotone_write() {
        let mut storage = BuggyStorage::new();
        storage.set(b"k".to_vec(), VersionedValue::new(b"newer".to_vec(), 200));
        storage.tick();
        storage.set(b"k".to_vec(), VersionedValue::new(b"older".to_vec(), 50));
        storage.tick();
        assert_eq!(
            storage.peek(b"k"),
            Some(&VersionedValue::new(b"newer".to_vec(), 200)),
            "a sound monotone-write storage must keep the higher-timestamp value"
        );
    }

    #[test]
    fn violating_mode_lets_an_older_write_clobber_a_newer_one() {
        let mut storage = BuggyStorage::new();
        storage.set(b"k".to_vec(), VersionedValue::new(b"newer".to_vec(), 200));
        storage.tick();
        storage.set_violate_monotone_write(true);
        storage.set(b"k".to_vec(), VersionedValue::new(b"older".to_vec(), 50));
        storage.tick();
        assert_eq!(
            storage.peek(b"k"),
            Some(&VersionedValue::new(b"older".to_vec(), 50)),
            "canary proves the property test would have caught a regression: \
             an older write clobbered a newer one"
        );
    }
}
