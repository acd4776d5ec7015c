//! # tickloom-runtime: the tick-driven runtime
//!
//! The pieces that turn a fixed per-tick ordering into a working
//! single-threaded substrate: the logical [`Clock`], the
//! [`ListenableFuture`] completion primitive, correlation-id generation
//! ([`IdGen`]), the [`RequestWaitingList`] and [`AsyncQuorumCallback`]
//! pending-request machinery, the [`MessageBus`], and the [`ProcessContext`]
//! every concrete process composes.
//!
//! Nothing here owns a `Network` or `Storage` implementation — those are
//! `tickloom-net` and `tickloom-storage`'s jobs respectively. This crate
//! only depends on `tickloom-net` for the `Network`/`MessageDispatcher`
//! traits the bus routes through.

mod bus;
mod clock;
mod future;
mod id_gen;
mod process;
mod quorum_callback;
mod waiting_list;

pub use bus::{MessageBus, MessageSink};
pub use clock::{Clock, StubClock, SystemClock};
pub use future::ListenableFuture;
pub use id_gen::{IdGen, SeededIdGen, UuidIdGen};
pub use process::{
    register_process, HandlerMap, HandlerTable, ProcessContext, SimProcess, Tickable,
};
pub use quorum_callback::AsyncQuorumCallback;
pub use waiting_list::{RequestCallback, RequestWaitingList};
