//! `MessageBus` — per-process routing with a self-delivery shortcut
//! (`spec.md` §4.3).

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tickloom_net::{MessageDispatcher, Network};
use tickloom_types::{Message, MessageType, PeerType, ProcessId};

/// Registered with the bus per process; `MessageBus` delivers by calling
/// `receive_message`. Implemented by every concrete process type
/// (`Process`, `Replica`, `QuorumReplica`, `ClusterClient`) — composition
/// over inheritance, per the design notes.
pub trait MessageSink {
    fn receive_message(&mut self, message: Message);
}

/// Holds `ProcessId → MessageSink` and the network the bus hands
/// non-self messages to. `dispatch` (invoked by the network during its
/// own `tick()`) and a self-addressed `send_message` both only enqueue
/// — the actual delivery to processes happens in `MessageBus::tick()`'s
/// drain loop. `inbound`/`current_tick` are interior-mutable so `tick()`
/// and `send_message()` both take `&self`: a handler running mid-drain
/// can call back into `send_message` (e.g. to reach another process, or
/// itself) without re-borrowing a bus the drain loop already holds
/// mutably, and a process fanning a message out to its own id never
/// re-enters its own still-borrowed `RefCell` — the enqueued self-message
/// is only popped and delivered once the drain loop comes back around,
/// by which point the sending handler has already returned.
pub struct MessageBus {
    processes: HashMap<String, Rc<RefCell<dyn MessageSink>>>,
    network: Rc<RefCell<dyn Network>>,
    inbound: RefCell<VecDeque<Message>>,
    current_tick: Cell<u64>,
}

impl MessageBus {
    pub fn new(network: Rc<RefCell<dyn Network>>) -> Self {
        Self {
            processes: HashMap::new(),
            network,
            inbound: RefCell::new(VecDeque::new()),
            current_tick: Cell::new(0),
        }
    }

    pub fn register(&mut self, id: &ProcessId, sink: Rc<RefCell<dyn MessageSink>>) {
        self.processes.insert(id.name().to_string(), sink);
    }

    /// Routes `message`: self-messages are enqueued for same-tick delivery
    /// through the drain loop in `tick()` (scenario S6), bypassing the
    /// network but never re-entering the sender synchronously. Everything
    /// else is handed to the network.
    pub fn send_message(&self, message: Message) {
        if message.source == message.destination {
            self.inbound.borrow_mut().push_back(message);
            return;
        }
        self.network.borrow_mut().send(message, self.current_tick.get());
    }

    fn deliver_locally(&self, message: Message) {
        match self.processes.get(message.destination.name()) {
            Some(sink) => sink.borrow_mut().receive_message(message),
            None => {
                tracing::warn!(destination = %message.destination, "message bus: unknown destination, dropping");
            }
        }
    }

    /// Sends `payload`/`message_type` to every id in `recipients` except
    /// `source`, each under a freshly generated correlation id.
    pub fn broadcast(
        &self,
        source: &ProcessId,
        recipients: &[ProcessId],
        peer_type: PeerType,
        message_type: impl Into<MessageType> + Clone,
        payload: Vec<u8>,
        mut next_correlation_id: impl FnMut() -> String,
    ) {
        for recipient in recipients {
            if recipient == source {
                continue;
            }
            let message = Message::new(
                source.clone(),
                recipient.clone(),
                peer_type,
                message_type.clone(),
                payload.clone(),
                Some(next_correlation_id()),
            );
            self.send_message(message);
        }
    }

    /// Drains messages the network delivered this tick, plus any
    /// self-messages sent during this same drain, into the registered
    /// processes. Takes `&self`: a handler invoked mid-drain can call
    /// `send_message` (including to its own id) and the result is simply
    /// enqueued for a later iteration of this same loop, never a
    /// reentrant `borrow_mut` on a sink already being delivered to.
    /// Advances the bus's view of the current tick for the next round of
    /// `send_message` calls.
    pub fn tick(&self, current_tick: u64) {
        self.current_tick.set(current_tick);
        loop {
            let message = self.inbound.borrow_mut().pop_front();
            match message {
                Some(message) => self.deliver_locally(message),
                None => break,
            }
        }
    }
}

impl MessageDispatcher for MessageBus {
    fn dispatch(&mut self, message: Message) {
        self.inbound.borrow_mut().push_back(message);
    }
}
