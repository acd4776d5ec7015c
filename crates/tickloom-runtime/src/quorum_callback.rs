//! `AsyncQuorumCallback` — aggregates per-peer responses and resolves on
//! majority (`spec.md` §4.7).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tickloom_types::{Message, ProcessId, TickLoomError};

use crate::future::ListenableFuture;
use crate::waiting_list::RequestCallback;

struct State<R> {
    majority: usize,
    expected: usize,
    predicate: Box<dyn Fn(&R) -> bool>,
    responses: HashMap<ProcessId, R>,
    error_count: usize,
    completed: bool,
    future: ListenableFuture<HashMap<ProcessId, R>>,
}

impl<R: Clone + 'static> State<R> {
    fn matching_count(&self) -> usize {
        self.responses.values().filter(|r| (self.predicate)(r)).count()
    }

    fn total_seen(&self) -> usize {
        self.responses.len() + self.error_count
    }

    fn record_response(&mut self, from: ProcessId, response: R) {
        if self.completed {
            return;
        }
        self.responses.insert(from, response);
        if self.matching_count() >= self.majority {
            self.completed = true;
            self.future.complete(self.responses.clone());
        } else if self.total_seen() == self.expected {
            self.completed = true;
            self.future.fail(TickLoomError::QuorumUnreachable);
        }
    }

    fn record_error(&mut self, error: TickLoomError) {
        if self.completed {
            return;
        }
        self.error_count += 1;
        let is_timeout = matches!(error, TickLoomError::RequestTimeout { .. });
        if is_timeout {
            self.completed = true;
            self.future.fail(error);
            return;
        }
        if self.matching_count() >= self.majority {
            self.completed = true;
            self.future.complete(self.responses.clone());
        } else if self.total_seen() == self.expected {
            self.completed = true;
            self.future.fail(TickLoomError::QuorumUnreachable);
        }
    }
}

/// Majority is `⌊N/2⌋ + 1`. Once `completed`, later responses and errors
/// are ignored — the invariant `spec.md` §3 calls out for the quorum
/// tally.
///
/// Cloning shares the underlying tally: `Replica::broadcast_to_all_replicas`
/// registers one clone per fan-out recipient under a distinct correlation
/// id, and all of them resolve the same aggregate future.
pub struct AsyncQuorumCallback<R> {
    state: Rc<RefCell<State<R>>>,
    decode: Rc<dyn Fn(&Message) -> Result<R, TickLoomError>>,
}

impl<R> Clone for AsyncQuorumCallback<R> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            decode: Rc::clone(&self.decode),
        }
    }
}

impl<R: Clone + 'static> AsyncQuorumCallback<R> {
    /// `decode` turns an incoming `Message`'s payload into the response
    /// type `R` (typically `codec.decode::<R>(&message.payload)`).
    pub fn new(
        expected: usize,
        predicate: impl Fn(&R) -> bool + 'static,
        decode: impl Fn(&Message) -> Result<R, TickLoomError> + 'static,
    ) -> (Self, ListenableFuture<HashMap<ProcessId, R>>) {
        let future = ListenableFuture::new();
        let majority = expected / 2 + 1;
        let state = Rc::new(RefCell::new(State {
            majority,
            expected,
            predicate: Box::new(predicate),
            responses: HashMap::new(),
            error_count: 0,
            completed: false,
            future: future.clone(),
        }));
        (
            Self {
                state,
                decode: Rc::new(decode),
            },
            future,
        )
    }
}

impl<R: Clone + 'static> RequestCallback for AsyncQuorumCallback<R> {
    fn on_response(&self, response: Message, from: Option<ProcessId>) {
        let from = match from {
            Some(id) => id,
            None => response.source.clone(),
        };
        match (self.decode)(&response) {
            Ok(decoded) => self.state.borrow_mut().record_response(from, decoded),
            Err(_) => self
                .state
                .borrow_mut()
                .record_error(TickLoomError::MalformedMessage(
                    "quorum response payload".to_string(),
                )),
        }
    }

    fn on_error(&self, error: TickLoomError) {
        self.state.borrow_mut().record_error(error);
    }
}
