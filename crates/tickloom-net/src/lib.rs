//! # tickloom-net: the `Network` contract
//!
//! One trait ([`Network`]), two implementations: [`SimNetwork`] for
//! deterministic tests (configurable delay, drop rate, partitions, all
//! driven off a seeded [`rng::SimRng`]), and [`MioNetwork`] as a sketch
//! of the real non-blocking transport `spec.md` §1 scopes out beyond its
//! interface.

mod mio_network;
mod network;
mod rng;

pub use mio_network::MioNetwork;
pub use network::{MessageDispatcher, Network, PartitionTable, SimNetwork, SimNetworkConfig};
pub use rng::SimRng;
