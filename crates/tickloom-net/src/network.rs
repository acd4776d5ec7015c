//! Network trait abstraction: simulation vs real non-blocking transport.
//!
//! The `Network` trait is on the cold path (I/O), so trait objects are
//! acceptable here — unlike the hot-path `Codec`, there is no need for
//! monomorphized generics.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use tickloom_types::{Message, ProcessId};

/// Installed on a `Network` to receive messages ready for application
/// delivery. `MessageBus` is the only production implementor.
pub trait MessageDispatcher {
    fn dispatch(&mut self, message: Message);
}

/// Common contract for simulated and real transports (`spec.md` §4.2).
///
/// `current_tick` is threaded through `send`/`tick` rather than read from
/// a shared clock so `Network` implementations stay free of any
/// dependency on `tickloom-runtime`'s `Clock` — the driver is the single
/// source of tick advancement.
pub trait Network {
    /// Enqueues a message for transmission. Non-blocking; never fails on
    /// an unknown destination — the message is delivered or silently
    /// dropped under failure injection.
    fn send(&mut self, message: Message, current_tick: u64);

    /// Performs one step of delivery work.
    fn tick(&mut self, current_tick: u64);

    /// Starts listening, for real networks. A no-op for the simulated one.
    fn bind(&mut self, _id: &ProcessId) {}

    /// Installs the callback invoked for every message ready for
    /// application delivery.
    fn register_dispatcher(&mut self, dispatcher: Rc<RefCell<dyn MessageDispatcher>>);

    /// Shuts the transport down. A no-op for the simulated network; real
    /// transports close their sockets here (`spec.md` §5 "Lifecycle").
    fn close(&mut self) {}
}

/// A symmetric, boolean partition table: `{a, b}` pairs currently
/// disallowed from delivery. Partitions are not directional.
#[derive(Debug, Default, Clone)]
pub struct PartitionTable {
    pairs: BTreeSet<(String, String)>,
}

fn ordered_pair(a: &ProcessId, b: &ProcessId) -> (String, String) {
    let (a, b) = (a.name().to_string(), b.name().to_string());
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl PartitionTable {
    pub fn partition(&mut self, a: &ProcessId, b: &ProcessId) {
        self.pairs.insert(ordered_pair(a, b));
    }

    pub fn heal(&mut self, a: &ProcessId, b: &ProcessId) {
        self.pairs.remove(&ordered_pair(a, b));
    }

    pub fn is_partitioned(&self, a: &ProcessId, b: &ProcessId) -> bool {
        self.pairs.contains(&ordered_pair(a, b))
    }
}

struct ScheduledPacket {
    message: Message,
    delivery_tick: u64,
    /// Tie-break for FIFO ordering between packets scheduled for the
    /// same tick on the same (source, destination) pair.
    sequence: u64,
}

/// Configuration knobs for `SimNetwork` (`spec.md` §4.2).
#[derive(Debug, Clone)]
pub struct SimNetworkConfig {
    pub delay_ticks: u64,
    pub drop_rate: f64,
    pub seed: u64,
}

impl Default for SimNetworkConfig {
    fn default() -> Self {
        Self {
            delay_ticks: 1,
            drop_rate: 0.0,
            seed: 0,
        }
    }
}

/// A deterministic, tick-scheduled network: every `send` either schedules
/// a future delivery or silently drops the message, according to
/// `config` and the seeded PRNG.
pub struct SimNetwork {
    config: SimNetworkConfig,
    rng: crate::rng::SimRng,
    partitions: PartitionTable,
    /// One queue per destination, kept sorted by `(delivery_tick,
    /// sequence)` on drain — cluster sizes in this substrate are small
    /// enough that a `BinaryHeap` would be premature.
    queues: HashMap<String, Vec<ScheduledPacket>>,
    dispatcher: Option<Rc<RefCell<dyn MessageDispatcher>>>,
    next_sequence: u64,
}

impl SimNetwork {
    pub fn new(config: SimNetworkConfig) -> Self {
        let rng = crate::rng::SimRng::new(config.seed);
        Self {
            config,
            rng,
            partitions: PartitionTable::default(),
            queues: HashMap::new(),
            dispatcher: None,
            next_sequence: 0,
        }
    }

    pub fn partition(&mut self, a: &ProcessId, b: &ProcessId) {
        self.partitions.partition(a, b);
    }

    pub fn heal(&mut self, a: &ProcessId, b: &ProcessId) {
        self.partitions.heal(a, b);
    }

    pub fn is_partitioned(&self, a: &ProcessId, b: &ProcessId) -> bool {
        self.partitions.is_partitioned(a, b)
    }

    fn queue_for(&mut self, destination: &ProcessId) -> &mut Vec<ScheduledPacket> {
        self.queues.entry(destination.name().to_string()).or_default()
    }
}

impl Network for SimNetwork {
    fn send(&mut self, message: Message, current_tick: u64) {
        if self.rng.chance(self.config.drop_rate) {
            tracing::debug!(
                source = %message.source,
                destination = %message.destination,
                "simulated network: send-time drop"
            );
            return;
        }
        let delivery_tick = current_tick + self.config.delay_ticks;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let destination = message.destination.clone();
        self.queue_for(&destination).push(ScheduledPacket {
            message,
            delivery_tick,
            sequence,
        });
    }

    fn tick(&mut self, current_tick: u64) {
        let dispatcher = match &self.dispatcher {
            Some(d) => Rc::clone(d),
            None => return,
        };

        let mut ready: Vec<(u64, u64, Message)> = Vec::new();
        for queue in self.queues.values_mut() {
            queue.sort_by_key(|p| (p.delivery_tick, p.sequence));
            let split = queue.partition_point(|p| p.delivery_tick <= current_tick);
            for packet in queue.drain(0..split) {
                ready.push((packet.delivery_tick, packet.sequence, packet.message));
            }
        }
        ready.sort_by_key(|(tick, seq, _)| (*tick, *seq));

        for (_, _, message) in ready {
            // Partitions are re-checked at delivery time, not just at
            // send time, so a partition opened in flight still drops it.
            if self
                .partitions
                .is_partitioned(&message.source, &message.destination)
            {
                tracing::debug!(
                    source = %message.source,
                    destination = %message.destination,
                    "simulated network: delivery-time partition drop"
                );
                continue;
            }
            dispatcher.borrow_mut().dispatch(message);
        }
    }

    fn register_dispatcher(&mut self, dispatcher: Rc<RefCell<dyn MessageDispatcher>>) {
        self.dispatcher = Some(dispatcher);
    }
}
