//! The `Storage` contract (`spec.md` §4.10 and the "Persistent Storage"
//! external collaborator in §6) plus `SimStorage`, the tick-delayed,
//! failure-injecting implementation used by every deterministic test in
//! this workspace.

use tickloom_net::SimRng;
use tickloom_runtime::ListenableFuture;
use tickloom_types::{TickLoomError, VersionedValue};

/// `get`/`set` return immediately with a future; completion is surfaced
/// later, on the driver thread, via `tick()` — there is no synchronous
/// path, simulated or real.
pub trait Storage {
    fn get(&mut self, key: Vec<u8>) -> ListenableFuture<Option<VersionedValue>>;
    fn set(&mut self, key: Vec<u8>, value: VersionedValue) -> ListenableFuture<bool>;

    /// Drains whatever work has become due. Takes no explicit tick
    /// argument — unlike `Network`, `Storage` owns its own internal tick
    /// counter (`spec.md` §4.10), advanced once per call.
    fn tick(&mut self);

    /// Shuts the backend down. `SimStorage` fails any still-pending
    /// operations with a cancellation error; a persistent backend would
    /// flush and close its handle here.
    fn close(&mut self);
}

/// What kind of operation a [`PendingOp`] represents, exposed so test code
/// and instrumentation can inspect in-flight work without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOpKind {
    Get,
    Set,
}

enum Completion {
    Get(ListenableFuture<Option<VersionedValue>>),
    Set {
        value: VersionedValue,
        future: ListenableFuture<bool>,
    },
}

struct PendingOp {
    key: Vec<u8>,
    completion_tick: u64,
    /// FIFO tie-break within the same `completion_tick`, per §4.10's
    /// "FIFO within the same tick" ordering rule.
    sequence: u64,
    completion: Completion,
}

impl PendingOp {
    fn kind(&self) -> PendingOpKind {
        match self.completion {
            Completion::Get(_) => PendingOpKind::Get,
            Completion::Set { .. } => PendingOpKind::Set,
        }
    }
}

/// Configuration knobs for [`SimStorage`] (`spec.md` §4.10).
#[derive(Debug, Clone)]
pub struct SimStorageConfig {
    pub delay_ticks: u64,
    pub failure_rate: f64,
    pub seed: u64,
}

impl Default for SimStorageConfig {
    fn default() -> Self {
        Self {
            delay_ticks: 1,
            failure_rate: 0.0,
            seed: 0,
        }
    }
}

/// An in-memory, tick-delayed key/value store with optional failure
/// injection. Holds the current mapping, a pending-operation queue kept
/// sorted by `(completion_tick, sequence)` on drain, an internal tick
/// counter, and a seeded PRNG for failure decisions.
pub struct SimStorage {
    config: SimStorageConfig,
    rng: SimRng,
    data: std::collections::HashMap<Vec<u8>, VersionedValue>,
    pending: Vec<PendingOp>,
    current_tick: u64,
    next_sequence: u64,
}

impl SimStorage {
    pub fn new(config: SimStorageConfig) -> Self {
        let rng = SimRng::new(config.seed);
        Self {
            config,
            rng,
            data: std::collections::HashMap::new(),
            pending: Vec::new(),
            current_tick: 0,
            next_sequence: 0,
        }
    }

    /// Reads the committed value synchronously, bypassing the tick-delay
    /// queue. Exists for test assertions and instrumentation only — no
    /// production code path should call this, since it would let a
    /// handler observe storage state without going through `tick()`.
    pub fn peek(&self, key: &[u8]) -> Option<&VersionedValue> {
        self.data.get(key)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_kinds(&self) -> Vec<PendingOpKind> {
        self.pending.iter().map(PendingOp::kind).collect()
    }

    fn enqueue(&mut self, key: Vec<u8>, completion: Completion) {
        let completion_tick = self.current_tick + self.config.delay_ticks;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.pending.push(PendingOp {
            key,
            completion_tick,
            sequence,
            completion,
        });
    }

    fn complete(&mut self, op: PendingOp) {
        if self.rng.chance(self.config.failure_rate) {
            match op.completion {
                Completion::Get(future) => future.fail(TickLoomError::StorageFailure),
                Completion::Set { future, .. } => future.fail(TickLoomError::StorageFailure),
            }
            return;
        }
        match op.completion {
            Completion::Get(future) => {
                let value = self.data.get(&op.key).cloned();
                future.complete(value);
            }
            Completion::Set { value, future } => {
                // Monotone write: overwrite only if absent or the stored
                // timestamp is strictly smaller. Either way, the write
                // "succeeds" from storage's point of view — the
                // coordinator's own idempotent-LWW check (§4.8) happens
                // one layer up, before storage.set is ever called.
                let should_write = match self.data.get(&op.key) {
                    Some(existing) => existing.timestamp < value.timestamp,
                    None => true,
                };
                if should_write {
                    self.data.insert(op.key, value);
                }
                future.complete(true);
            }
        }
    }
}

impl Storage for SimStorage {
    fn get(&mut self, key: Vec<u8>) -> ListenableFuture<Option<VersionedValue>> {
        let future = ListenableFuture::new();
        self.enqueue(key, Completion::Get(future.clone()));
        future
    }

    fn set(&mut self, key: Vec<u8>, value: VersionedValue) -> ListenableFuture<bool> {
        let future = ListenableFuture::new();
        self.enqueue(
            key,
            Completion::Set {
                value,
                future: future.clone(),
            },
        );
        future
    }

    fn tick(&mut self) {
        self.current_tick += 1;
        self.pending
            .sort_by_key(|op| (op.completion_tick, op.sequence));
        let split = self
            .pending
            .partition_point(|op| op.completion_tick <= self.current_tick);
        let ready: Vec<PendingOp> = self.pending.drain(0..split).collect();
        for op in ready {
            self.complete(op);
        }
    }

    fn close(&mut self) {
        for op in self.pending.drain(..) {
            match op.completion {
                Completion::Get(future) => future.fail(TickLoomError::Shutdown),
                Completion::Set { future, .. } => future.fail(TickLoomError::Shutdown),
            }
        }
    }
}
