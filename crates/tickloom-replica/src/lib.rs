//! # tickloom-replica: the quorum-replicated key/value protocol
//!
//! [`Replica`] is the composable base every protocol-bearing process
//! starts from (peer list, storage handle, fan-out helper).
//! [`QuorumReplica`] builds the last-writer-wins quorum GET/SET protocol
//! on top of it, and [`ClusterClient`] is the process a test or caller
//! drives to issue requests against a replica set.

mod cluster_client;
mod quorum_replica;
mod replica;
mod reply;

pub use cluster_client::ClusterClient;
pub use quorum_replica::QuorumReplica;
pub use replica::Replica;
