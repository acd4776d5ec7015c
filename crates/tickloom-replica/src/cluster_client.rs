//! `ClusterClient` (`spec.md` §4.4, §6) — the client-side process: sends
//! `CLIENT_GET_REQUEST`/`CLIENT_SET_REQUEST` to a replica and resolves a
//! `ListenableFuture` with the decoded response.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use tickloom_runtime::{
    HandlerMap, HandlerTable, ListenableFuture, MessageSink, ProcessContext, RequestCallback,
    Tickable,
};
use tickloom_types::{
    message_types, payloads, Codec, Message, MessageType, PeerType, ProcessId, TickLoomError,
};

/// Decodes an incoming response's payload into `R` and resolves a
/// `ListenableFuture<R>`. The bridge between the waiting list's
/// `Message`-typed callback interface and the typed futures `get`/`set`
/// hand back to callers.
struct ResponseBridge<R> {
    codec: Rc<dyn Codec>,
    future: ListenableFuture<R>,
}

impl<R: Clone + DeserializeOwned + 'static> RequestCallback for ResponseBridge<R> {
    fn on_response(&self, response: Message, _from: Option<ProcessId>) {
        match self.codec.decode::<R>(&response.payload) {
            Ok(decoded) => self.future.complete(decoded),
            Err(e) => self.future.fail(e),
        }
    }

    fn on_error(&self, error: TickLoomError) {
        self.future.fail(error);
    }
}

/// A process that issues client requests against the replica set and has
/// no storage or peer fan-out of its own — just the `ProcessContext`
/// helpers and a list of replicas to send to.
pub struct ClusterClient {
    pub ctx: ProcessContext,
    pub replica_endpoints: Vec<ProcessId>,
    handlers: HandlerMap<ClusterClient>,
}

impl ClusterClient {
    pub fn new(ctx: ProcessContext, replica_endpoints: Vec<ProcessId>) -> Self {
        Self {
            ctx,
            replica_endpoints,
            handlers: Self::initialise_handlers(),
        }
    }

    /// The replica every request is sent to. `spec.md` names no routing
    /// or retry policy for a down or partitioned first replica — picking
    /// the first configured endpoint is this client's whole strategy.
    fn target(&self) -> ProcessId {
        self.replica_endpoints
            .first()
            .cloned()
            .expect("ClusterClient requires at least one replica endpoint")
    }

    fn send_request<R: Clone + DeserializeOwned + 'static>(
        &self,
        destination: ProcessId,
        message_type: impl Into<MessageType>,
        payload: Vec<u8>,
    ) -> ListenableFuture<R> {
        let future = ListenableFuture::new();
        let correlation_id = self.ctx.next_correlation_id();
        let bridge: Box<dyn RequestCallback> = Box::new(ResponseBridge {
            codec: Rc::clone(&self.ctx.codec),
            future: future.clone(),
        });
        if let Err(e) =
            self.ctx
                .waiting_list
                .borrow_mut()
                .add(correlation_id.clone(), bridge, self.ctx.request_timeout_ticks)
        {
            future.fail(e);
            return future;
        }
        let message = Message::new(
            self.ctx.id.clone(),
            destination,
            PeerType::Client,
            message_type,
            payload,
            Some(correlation_id),
        );
        self.ctx.send(message);
        future
    }

    pub fn get(&self, key: Vec<u8>) -> ListenableFuture<payloads::ClientGetResponse> {
        self.get_via(&self.target(), key)
    }

    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) -> ListenableFuture<payloads::ClientSetResponse> {
        self.set_via(&self.target(), key, value)
    }

    /// Sends the GET through a specific replica rather than the default
    /// first endpoint — `spec.md` §4.9 only fixes the default, not the
    /// choice of coordinator.
    pub fn get_via(&self, coordinator: &ProcessId, key: Vec<u8>) -> ListenableFuture<payloads::ClientGetResponse> {
        let payload = payloads::ClientGetRequest { key };
        match self.ctx.serialize(&payload) {
            Ok(bytes) => self.send_request(coordinator.clone(), message_types::CLIENT_GET_REQUEST, bytes),
            Err(e) => {
                let future = ListenableFuture::new();
                future.fail(e);
                future
            }
        }
    }

    /// Sends the SET through a specific replica rather than the default
    /// first endpoint.
    pub fn set_via(
        &self,
        coordinator: &ProcessId,
        key: Vec<u8>,
        value: Vec<u8>,
    ) -> ListenableFuture<payloads::ClientSetResponse> {
        let payload = payloads::ClientSetRequest { key, value };
        match self.ctx.serialize(&payload) {
            Ok(bytes) => self.send_request(coordinator.clone(), message_types::CLIENT_SET_REQUEST, bytes),
            Err(e) => {
                let future = ListenableFuture::new();
                future.fail(e);
                future
            }
        }
    }
}

impl HandlerTable for ClusterClient {
    fn initialise_handlers() -> HandlerMap<Self> {
        let mut handlers: HandlerMap<Self> = HashMap::new();
        handlers.insert(
            MessageType::new(message_types::CLIENT_GET_RESPONSE),
            handle_response as fn(&mut Self, Message),
        );
        handlers.insert(
            MessageType::new(message_types::CLIENT_SET_RESPONSE),
            handle_response as fn(&mut Self, Message),
        );
        handlers
    }
}

fn handle_response(client: &mut ClusterClient, message: Message) {
    let Some(correlation_id) = message.correlation_id.clone() else {
        tracing::warn!("dropping client response without a correlation id");
        return;
    };
    let from = message.source.clone();
    client
        .ctx
        .waiting_list
        .borrow_mut()
        .handle_response(&correlation_id, message, Some(from));
}

impl MessageSink for ClusterClient {
    fn receive_message(&mut self, message: Message) {
        match self.handlers.get(&message.message_type).copied() {
            Some(handler) => handler(self, message),
            None => {
                tracing::warn!(message_type = %message.message_type, "unknown message type, dropping");
            }
        }
    }
}

impl Tickable for ClusterClient {
    fn tick(&mut self) {
        self.ctx.tick();
    }

    fn shutdown(&mut self) {
        self.ctx.cancel_pending();
    }
}
