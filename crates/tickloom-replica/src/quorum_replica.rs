//! `QuorumReplica` — the last-writer-wins quorum key/value protocol
//! (`spec.md` §4.8). Composes a [`Replica`] and plugs in the six-entry
//! handler table the wire protocol table in §6 names.

use std::collections::HashMap;
use std::rc::Rc;

use tickloom_runtime::{AsyncQuorumCallback, HandlerMap, HandlerTable, MessageSink, Tickable};
use tickloom_types::{
    message_types, payloads, Message, MessageType, PeerType, ProcessId, VersionedValue,
};

use crate::replica::Replica;
use crate::reply::reply;

/// Composes a `Replica` with the dispatch table for the six message
/// types the quorum protocol defines. Built once per process at
/// construction (design note 4.9: no virtual dispatch, just a function
/// pointer table captured at construction).
pub struct QuorumReplica {
    pub replica: Replica,
    handlers: HandlerMap<QuorumReplica>,
}

impl QuorumReplica {
    pub fn new(replica: Replica) -> Self {
        Self {
            replica,
            handlers: Self::initialise_handlers(),
        }
    }
}

impl HandlerTable for QuorumReplica {
    fn initialise_handlers() -> HandlerMap<Self> {
        let mut handlers: HandlerMap<Self> = HashMap::new();
        handlers.insert(
            MessageType::new(message_types::CLIENT_GET_REQUEST),
            handle_client_get_request as fn(&mut Self, Message),
        );
        handlers.insert(
            MessageType::new(message_types::CLIENT_SET_REQUEST),
            handle_client_set_request as fn(&mut Self, Message),
        );
        handlers.insert(
            MessageType::new(message_types::INTERNAL_GET_REQUEST),
            handle_internal_get_request as fn(&mut Self, Message),
        );
        handlers.insert(
            MessageType::new(message_types::INTERNAL_SET_REQUEST),
            handle_internal_set_request as fn(&mut Self, Message),
        );
        handlers.insert(
            MessageType::new(message_types::INTERNAL_GET_RESPONSE),
            handle_internal_get_response as fn(&mut Self, Message),
        );
        handlers.insert(
            MessageType::new(message_types::INTERNAL_SET_RESPONSE),
            handle_internal_set_response as fn(&mut Self, Message),
        );
        handlers
    }
}

impl MessageSink for QuorumReplica {
    fn receive_message(&mut self, message: Message) {
        match self.handlers.get(&message.message_type).copied() {
            Some(handler) => handler(self, message),
            None => {
                tracing::warn!(message_type = %message.message_type, "unknown message type, dropping");
            }
        }
    }
}

impl Tickable for QuorumReplica {
    fn tick(&mut self) {
        self.replica.ctx.tick();
    }

    fn shutdown(&mut self) {
        self.replica.ctx.cancel_pending();
    }
}

// ---------------------------------------------------------------------
// Client SET flow (spec.md §4.8 "Client SET flow")
// ---------------------------------------------------------------------

fn handle_client_set_request(replica: &mut QuorumReplica, message: Message) {
    let request: payloads::ClientSetRequest = match replica.replica.ctx.deserialize(&message.payload)
    {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed CLIENT_SET_REQUEST");
            return;
        }
    };

    // The coordinator computes the LWW timestamp exactly once, up front —
    // every internal SET request this fan-out produces carries the same
    // `ts`, per §4.8 step 2.
    let ts = replica.replica.ctx.clock.borrow().now();
    let n = replica.replica.all_nodes().len();

    let codec_for_decode = Rc::clone(&replica.replica.ctx.codec);
    let (quorum, future) = AsyncQuorumCallback::new(
        n,
        |resp: &payloads::InternalSetResponse| resp.success,
        move |msg: &Message| codec_for_decode.decode::<payloads::InternalSetResponse>(&msg.payload),
    );

    let request_payload = payloads::InternalSetRequest {
        key: request.key.clone(),
        value: request.value.clone(),
        timestamp: ts,
    };
    let request_bytes = match replica.replica.ctx.serialize(&request_payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode INTERNAL_SET_REQUEST, aborting SET");
            return;
        }
    };
    let self_id = replica.replica.ctx.id.clone();
    replica
        .replica
        .broadcast_to_all_replicas(&quorum, |node, correlation_id| {
            Message::new(
                self_id.clone(),
                node.clone(),
                PeerType::Replica,
                message_types::INTERNAL_SET_REQUEST,
                request_bytes.clone(),
                Some(correlation_id),
            )
        });

    let bus = Rc::clone(&replica.replica.ctx.bus);
    let codec = Rc::clone(&replica.replica.ctx.codec);
    let self_id = replica.replica.ctx.id.clone();
    let incoming = message.clone();
    let key = request.key.clone();

    let bus_err = Rc::clone(&bus);
    let codec_err = Rc::clone(&codec);
    let self_id_err = self_id.clone();
    let incoming_err = incoming.clone();
    let key_err = key.clone();

    future.on_success(move |_responses| {
        let payload = payloads::ClientSetResponse {
            key: key.clone(),
            success: true,
        };
        reply(
            &codec,
            &bus,
            &self_id,
            &incoming,
            message_types::CLIENT_SET_RESPONSE,
            &payload,
        );
    });
    future.on_failure(move |_error| {
        let payload = payloads::ClientSetResponse {
            key: key_err.clone(),
            success: false,
        };
        reply(
            &codec_err,
            &bus_err,
            &self_id_err,
            &incoming_err,
            message_types::CLIENT_SET_RESPONSE,
            &payload,
        );
    });
}

/// Internal SET handler (`spec.md` §4.8 "Internal SET handler"): read the
/// existing value, acknowledge without overwriting if it's already at
/// least as new (idempotent LWW), otherwise write through to storage and
/// echo its result.
fn handle_internal_set_request(replica: &mut QuorumReplica, message: Message) {
    let request: payloads::InternalSetRequest =
        match replica.replica.ctx.deserialize(&message.payload) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed INTERNAL_SET_REQUEST");
                return;
            }
        };

    let bus = Rc::clone(&replica.replica.ctx.bus);
    let codec = Rc::clone(&replica.replica.ctx.codec);
    let self_id = replica.replica.ctx.id.clone();
    let incoming = message.clone();
    let storage = Rc::clone(&replica.replica.storage);
    let key = request.key.clone();
    let value = request.value.clone();
    let ts = request.timestamp;

    let read_future = replica.replica.storage.borrow_mut().get(request.key.clone());
    read_future.handle(move |result, error| {
        let existing: Option<VersionedValue> = if error.is_some() {
            None
        } else {
            result.cloned().flatten()
        };

        if let Some(existing) = &existing {
            if existing.timestamp >= ts {
                let payload = payloads::InternalSetResponse {
                    key: key.clone(),
                    success: true,
                };
                reply(
                    &codec,
                    &bus,
                    &self_id,
                    &incoming,
                    message_types::INTERNAL_SET_RESPONSE,
                    &payload,
                );
                return;
            }
        }

        let versioned = VersionedValue::new(value.clone(), ts);
        let write_future = storage.borrow_mut().set(key.clone(), versioned);

        let bus2 = Rc::clone(&bus);
        let codec2 = Rc::clone(&codec);
        let self_id2 = self_id.clone();
        let incoming2 = incoming.clone();
        let key2 = key.clone();
        write_future.handle(move |result, error| {
            let success = error.is_none() && result.copied().unwrap_or(false);
            let payload = payloads::InternalSetResponse {
                key: key2.clone(),
                success,
            };
            reply(
                &codec2,
                &bus2,
                &self_id2,
                &incoming2,
                message_types::INTERNAL_SET_RESPONSE,
                &payload,
            );
        });
    });
}

// ---------------------------------------------------------------------
// Client GET flow (spec.md §4.8 "Client GET flow")
// ---------------------------------------------------------------------

fn handle_client_get_request(replica: &mut QuorumReplica, message: Message) {
    let request: payloads::ClientGetRequest = match replica.replica.ctx.deserialize(&message.payload)
    {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed CLIENT_GET_REQUEST");
            return;
        }
    };

    let n = replica.replica.all_nodes().len();

    let codec_for_decode = Rc::clone(&replica.replica.ctx.codec);
    let (quorum, future) = AsyncQuorumCallback::new(
        n,
        |resp: &payloads::InternalGetResponse| resp.value.is_some(),
        move |msg: &Message| codec_for_decode.decode::<payloads::InternalGetResponse>(&msg.payload),
    );

    let request_payload = payloads::InternalGetRequest {
        key: request.key.clone(),
    };
    let request_bytes = match replica.replica.ctx.serialize(&request_payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode INTERNAL_GET_REQUEST, aborting GET");
            return;
        }
    };
    let self_id = replica.replica.ctx.id.clone();
    replica
        .replica
        .broadcast_to_all_replicas(&quorum, |node, correlation_id| {
            Message::new(
                self_id.clone(),
                node.clone(),
                PeerType::Replica,
                message_types::INTERNAL_GET_REQUEST,
                request_bytes.clone(),
                Some(correlation_id),
            )
        });

    let bus = Rc::clone(&replica.replica.ctx.bus);
    let codec = Rc::clone(&replica.replica.ctx.codec);
    let self_id = replica.replica.ctx.id.clone();
    let incoming = message.clone();
    let key = request.key.clone();

    let bus_err = Rc::clone(&bus);
    let codec_err = Rc::clone(&codec);
    let self_id_err = self_id.clone();
    let incoming_err = incoming.clone();
    let key_err = key.clone();

    future.on_success(move |responses: &HashMap<ProcessId, payloads::InternalGetResponse>| {
        // Reconcile by highest timestamp; tie-break deterministically by
        // responder id (`spec.md` §4.8 "Tie-breaks and edge cases").
        let best = responses
            .iter()
            .filter_map(|(pid, resp)| resp.value.as_ref().map(|v| (pid, v)))
            .max_by(|(pid_a, v_a), (pid_b, v_b)| {
                v_a.timestamp.cmp(&v_b.timestamp).then_with(|| pid_a.cmp(pid_b))
            });

        let (found, value) = match best {
            Some((_, v)) => (true, Some(v.value.clone())),
            None => (false, None),
        };
        let payload = payloads::ClientGetResponse {
            key: key.clone(),
            value,
            found,
        };
        reply(
            &codec,
            &bus,
            &self_id,
            &incoming,
            message_types::CLIENT_GET_RESPONSE,
            &payload,
        );
    });
    future.on_failure(move |_error| {
        let payload = payloads::ClientGetResponse {
            key: key_err.clone(),
            value: None,
            found: false,
        };
        reply(
            &codec_err,
            &bus_err,
            &self_id_err,
            &incoming_err,
            message_types::CLIENT_GET_RESPONSE,
            &payload,
        );
    });
}

/// Internal GET handler: a plain local lookup, no fan-out. Storage
/// failures still produce a response — per `spec.md` §7, an absent
/// `value` rather than a dropped message, so the coordinator's quorum
/// tally sees it as a non-matching response instead of waiting out a
/// full timeout for this one peer.
fn handle_internal_get_request(replica: &mut QuorumReplica, message: Message) {
    let request: payloads::InternalGetRequest =
        match replica.replica.ctx.deserialize(&message.payload) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed INTERNAL_GET_REQUEST");
                return;
            }
        };

    let bus = Rc::clone(&replica.replica.ctx.bus);
    let codec = Rc::clone(&replica.replica.ctx.codec);
    let self_id = replica.replica.ctx.id.clone();
    let incoming = message.clone();
    let key = request.key.clone();

    let future = replica.replica.storage.borrow_mut().get(request.key);
    future.handle(move |result, error| {
        let value = if error.is_some() {
            None
        } else {
            result.cloned().flatten()
        };
        let payload = payloads::InternalGetResponse {
            key: key.clone(),
            value,
        };
        reply(
            &codec,
            &bus,
            &self_id,
            &incoming,
            message_types::INTERNAL_GET_RESPONSE,
            &payload,
        );
    });
}

// ---------------------------------------------------------------------
// Internal response handlers — route by correlation id into whichever
// `AsyncQuorumCallback` is waiting (`spec.md` §4.9's "response handlers
// simply forward into the waiting list", applied to replica-to-replica
// traffic rather than just the client boundary).
// ---------------------------------------------------------------------

fn handle_internal_get_response(replica: &mut QuorumReplica, message: Message) {
    forward_internal_response(replica, message);
}

fn handle_internal_set_response(replica: &mut QuorumReplica, message: Message) {
    forward_internal_response(replica, message);
}

fn forward_internal_response(replica: &mut QuorumReplica, message: Message) {
    let Some(correlation_id) = message.correlation_id.clone() else {
        tracing::warn!("dropping internal response without a correlation id");
        return;
    };
    let from = message.source.clone();
    replica
        .replica
        .ctx
        .waiting_list
        .borrow_mut()
        .handle_response(&correlation_id, message, Some(from));
}
