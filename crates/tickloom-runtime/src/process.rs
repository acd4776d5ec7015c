//! `Process` base (`spec.md` §4.4) — the shared context and helper
//! methods every concrete process (`Replica`, `QuorumReplica`,
//! `ClusterClient`) composes rather than inherits from (design note 4.9).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tickloom_types::{Codec, Message, MessageType, PeerType, ProcessId, TickLoomError};

use crate::bus::MessageBus;
use crate::clock::Clock;
use crate::id_gen::IdGen;
use crate::waiting_list::RequestWaitingList;

/// A fixed-signature handler function. Function pointers (not
/// closures) because the table is built once from `S`'s type alone —
/// `initialise_handlers` runs before any instance exists.
pub type HandlerMap<S> = HashMap<MessageType, fn(&mut S, Message)>;

/// Implemented by every concrete process type to supply its dispatch
/// table, mirroring `spec.md`'s "construction calls `initialiseHandlers`"
/// requirement without virtual dispatch.
pub trait HandlerTable: Sized {
    fn initialise_handlers() -> HandlerMap<Self>;
}

/// Shared state and helpers every `Process` subclass composes: bus
/// handle, codec, clock, id generator, and the correlation-keyed waiting
/// list.
pub struct ProcessContext {
    pub id: ProcessId,
    pub bus: Rc<RefCell<MessageBus>>,
    pub codec: Rc<dyn Codec>,
    pub clock: Rc<RefCell<dyn Clock>>,
    pub id_gen: RefCell<Box<dyn IdGen>>,
    pub waiting_list: RefCell<RequestWaitingList>,
    /// Tick budget handed to every `waiting_list.add` call this process
    /// makes (client sends, replica fan-out). A single process-wide value
    /// rather than a per-call parameter — `spec.md` §9 treats "non-positive
    /// is a configuration error" as a construction-time property, not a
    /// per-request one.
    pub request_timeout_ticks: u64,
}

impl ProcessContext {
    pub fn new(
        id: ProcessId,
        bus: Rc<RefCell<MessageBus>>,
        codec: Rc<dyn Codec>,
        clock: Rc<RefCell<dyn Clock>>,
        id_gen: Box<dyn IdGen>,
        request_timeout_ticks: u64,
    ) -> Self {
        Self {
            id,
            bus,
            codec,
            clock,
            id_gen: RefCell::new(id_gen),
            waiting_list: RefCell::new(RequestWaitingList::new()),
            request_timeout_ticks,
        }
    }

    pub fn next_correlation_id(&self) -> String {
        self.id_gen.borrow_mut().next_id()
    }

    pub fn create_message(
        &self,
        destination: ProcessId,
        peer_type: PeerType,
        message_type: impl Into<MessageType>,
        payload: Vec<u8>,
        correlation_id: Option<String>,
    ) -> Message {
        Message::new(
            self.id.clone(),
            destination,
            peer_type,
            message_type,
            payload,
            correlation_id,
        )
    }

    /// Builds a response to `incoming`, echoing its correlation id so it
    /// routes back to whichever waiting-list entry sent the request.
    pub fn create_response_message(
        &self,
        incoming: &Message,
        message_type: impl Into<MessageType>,
        payload: Vec<u8>,
    ) -> Message {
        Message::new(
            self.id.clone(),
            incoming.source.clone(),
            incoming.peer_type,
            message_type,
            payload,
            incoming.correlation_id.clone(),
        )
    }

    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, TickLoomError> {
        self.codec.encode(value)
    }

    pub fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, TickLoomError> {
        self.codec.decode(bytes)
    }

    pub fn send(&self, message: Message) {
        self.bus.borrow().send_message(message);
    }

    /// Advances the waiting list by one tick, failing any entries whose
    /// timeout just expired.
    pub fn tick(&self) {
        self.waiting_list.borrow_mut().tick();
    }

    /// Fails every pending request with a cancellation error. Called once
    /// by the cluster harness during shutdown (`spec.md` §5, §7).
    pub fn cancel_pending(&self) {
        self.waiting_list.borrow_mut().cancel_all();
    }
}

/// The capability a driver needs to advance a process each tick and to
/// shut it down cleanly. Implemented by every concrete process type
/// (`Replica`/`QuorumReplica`, `ClusterClient`) alongside `MessageSink` —
/// together the two traits are everything the `Cluster` harness needs to
/// hold a process as a trait object.
pub trait Tickable {
    /// Advances this process's internal state (chiefly its waiting list)
    /// by one tick. Corresponds to the "Process.tick" step of the fixed
    /// per-tick order in `spec.md` §2.
    fn tick(&mut self);

    /// Fails all pending requests with a shutdown cancellation error.
    fn shutdown(&mut self);
}

/// Everything the `Cluster` harness needs to drive a process: message
/// delivery plus per-tick advancement and shutdown. Blanket-implemented —
/// no process type needs to name it explicitly.
pub trait SimProcess: crate::bus::MessageSink + Tickable {}
impl<T: crate::bus::MessageSink + Tickable> SimProcess for T {}

/// Registers `process` (already wrapped for shared ownership) with the
/// bus under `id`. Kept as a free function rather than a
/// `ProcessContext` method because registration needs the concrete,
/// fully-constructed type (the `MessageSink` impl), not just the shared
/// context fields — see design note 4.9 on the bus/process cycle.
pub fn register_process<P: crate::bus::MessageSink + 'static>(
    bus: &Rc<RefCell<MessageBus>>,
    id: &ProcessId,
    process: Rc<RefCell<P>>,
) {
    bus.borrow_mut().register(id, process);
}
