//! Small helper shared by every `QuorumReplica` handler: build a response
//! message back to whoever sent `incoming`, echoing its correlation id,
//! and hand it to the bus. Factored out once the third copy of this
//! four-line pattern showed up across the client/internal GET/SET
//! handlers.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tickloom_runtime::MessageBus;
use tickloom_types::{Codec, Message, MessageType, ProcessId};

pub(crate) fn send_reply(
    bus: &Rc<RefCell<MessageBus>>,
    self_id: &ProcessId,
    incoming: &Message,
    message_type: impl Into<MessageType>,
    payload: Vec<u8>,
) {
    let message = Message::new(
        self_id.clone(),
        incoming.source.clone(),
        incoming.peer_type,
        message_type,
        payload,
        incoming.correlation_id.clone(),
    );
    bus.borrow().send_message(message);
}

/// Encodes `payload` with `codec` and sends it as a reply to `incoming`.
/// Encoding failures are logged and swallowed — per `spec.md` §7, a
/// handler that cannot produce a well-formed response simply lets its
/// peer's waiting-list entry time out rather than sending malformed bytes.
pub(crate) fn reply<T: Serialize>(
    codec: &Rc<dyn Codec>,
    bus: &Rc<RefCell<MessageBus>>,
    self_id: &ProcessId,
    incoming: &Message,
    message_type: impl Into<MessageType>,
    payload: &T,
) {
    match codec.encode(payload) {
        Ok(bytes) => send_reply(bus, self_id, incoming, message_type, bytes),
        Err(e) => tracing::warn!(error = %e, "failed to encode reply payload, dropping"),
    }
}
