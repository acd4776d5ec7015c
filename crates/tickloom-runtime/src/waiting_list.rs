//! `RequestWaitingList` — correlation-id-keyed pending requests with
//! tick-based expiry (`spec.md` §4.6).

use std::collections::HashMap;

use tickloom_types::{Message, ProcessId, TickLoomError};

/// Receives the outcome of a pending request. Implemented both by the
/// `ClusterClient`'s bridge-to-future callback and by
/// `AsyncQuorumCallback` (§4.7), so one waiting list serves both client
/// requests and internal fan-out.
pub trait RequestCallback {
    fn on_response(&self, response: Message, from: Option<ProcessId>);
    fn on_error(&self, error: TickLoomError);
}

struct Timeout {
    remaining_ticks: u64,
    total_ticks: u64,
}

impl Timeout {
    fn new(ticks: u64) -> Self {
        Self {
            remaining_ticks: ticks,
            total_ticks: ticks,
        }
    }

    /// Returns true once the timeout has elapsed.
    fn tick(&mut self) -> bool {
        self.remaining_ticks = self.remaining_ticks.saturating_sub(1);
        self.remaining_ticks == 0
    }
}

struct Entry {
    callback: Box<dyn RequestCallback>,
    timeout: Timeout,
}

/// At most one entry per correlation id. On response or timeout the
/// entry is removed exactly once before its callback runs.
#[derive(Default)]
pub struct RequestWaitingList {
    entries: HashMap<String, Entry>,
}

impl RequestWaitingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `key` with a timeout of
    /// `expiration_ticks`. A non-positive timeout is a configuration
    /// error (`spec.md` §9, "known ambiguities").
    pub fn add(
        &mut self,
        key: String,
        callback: Box<dyn RequestCallback>,
        expiration_ticks: u64,
    ) -> Result<(), TickLoomError> {
        if expiration_ticks == 0 {
            return Err(TickLoomError::InvalidConfig(
                "requestTimeoutTicks must be > 0".to_string(),
            ));
        }
        self.entries.insert(
            key,
            Entry {
                callback,
                timeout: Timeout::new(expiration_ticks),
            },
        );
        Ok(())
    }

    /// Pops the entry for `key` if present and invokes its callback. A
    /// response for an already-removed (expired or already-answered) key
    /// is a no-op.
    pub fn handle_response(&mut self, key: &str, response: Message, from: Option<ProcessId>) {
        if let Some(entry) = self.entries.remove(key) {
            entry.callback.on_response(response, from);
        }
    }

    pub fn handle_error(&mut self, key: &str, error: TickLoomError) {
        if let Some(entry) = self.entries.remove(key) {
            entry.callback.on_error(error);
        }
    }

    /// Advances every pending entry's timeout by one tick, removing and
    /// failing all that have just expired.
    pub fn tick(&mut self) {
        let expired: Vec<String> = self
            .entries
            .iter_mut()
            .filter_map(|(key, entry)| {
                if entry.timeout.tick() {
                    Some(key.clone())
                } else {
                    None
                }
            })
            .collect();
        for key in expired {
            if let Some(entry) = self.entries.remove(&key) {
                let ticks = entry.timeout.total_ticks;
                tracing::debug!(correlation_id = %key, ticks, "request expired");
                entry
                    .callback
                    .on_error(TickLoomError::RequestTimeout { ticks });
            }
        }
    }

    /// Fails every pending entry with [`TickLoomError::Shutdown`] and
    /// removes it. Called once, from `close()`, at the end of a cluster's
    /// lifetime (`spec.md` §5 "Lifecycle").
    pub fn cancel_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.callback.on_error(TickLoomError::Shutdown);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}
