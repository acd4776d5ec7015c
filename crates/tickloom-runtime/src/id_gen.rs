//! Correlation-id generation (`spec.md` §3 "Correlation id").
//!
//! Production uses UUIDs; simulation uses a seeded, deterministic
//! generator keyed on the owning process so two runs with the same seed
//! produce byte-identical correlation ids — load-bearing for the
//! determinism property in `spec.md` §8.

use tickloom_types::ProcessId;

pub trait IdGen {
    fn next_id(&mut self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next_id(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic id generator: `{process-name}-{counter}`, counter
/// starting at zero and incrementing per call.
#[derive(Debug, Clone)]
pub struct SeededIdGen {
    process_name: String,
    counter: u64,
}

impl SeededIdGen {
    pub fn new(owner: &ProcessId) -> Self {
        Self {
            process_name: owner.name().to_string(),
            counter: 0,
        }
    }
}

impl IdGen for SeededIdGen {
    fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.process_name, self.counter);
        self.counter += 1;
        id
    }
}
