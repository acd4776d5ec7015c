//! # tickloom-sim: the deterministic cluster test harness
//!
//! [`Cluster`]/[`ClusterBuilder`] wire up a `SimNetwork`-backed topology
//! of [`tickloom_replica::QuorumReplica`]s and drive them through the
//! fixed per-tick order. The rest of this crate is test-only: the
//! concrete end-to-end scenarios (`scenarios`), the universally
//! quantified properties (`properties`), and the fault-injecting
//! storage double those properties verify against (`canary`).

mod cluster;

#[cfg(test)]
mod canary;
#[cfg(test)]
mod properties;
#[cfg(test)]
mod scenarios;

pub use cluster::{Cluster, ClusterBuilder};
