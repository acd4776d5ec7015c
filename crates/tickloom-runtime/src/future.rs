//! `ListenableFuture` — a single-completion, single-threaded future
//! (`spec.md` §4.5). Everything in this substrate runs on the driver
//! thread, so completion is modeled as a sum type over
//! `{Pending, Completed(T), Failed(E)}` behind `Rc<RefCell<_>>`, not an
//! `async` future — there is no executor, no `Waker`, no `Send` bound.

use std::cell::RefCell;
use std::rc::Rc;

use tickloom_types::TickLoomError;

enum State<T> {
    Pending,
    Completed(T),
    Failed(TickLoomError),
}

struct Inner<T> {
    state: State<T>,
    on_success: Vec<Box<dyn FnOnce(&T)>>,
    on_failure: Vec<Box<dyn FnOnce(&TickLoomError)>>,
}

/// A tick-safe, single-completion future.
///
/// Cloning a `ListenableFuture` clones the handle, not the value — both
/// handles observe the same completion, matching the teacher's
/// `Rc`-shared-state convention for single-threaded runtime types.
pub struct ListenableFuture<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for ListenableFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Default for ListenableFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> ListenableFuture<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                on_success: Vec::new(),
                on_failure: Vec::new(),
            })),
        }
    }

    /// Transitions pending → completed exactly once; later calls are
    /// ignored, matching `complete`/`fail`'s idempotence contract.
    pub fn complete(&self, value: T) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            inner.state = State::Completed(value.clone());
            std::mem::take(&mut inner.on_success)
        };
        for cb in callbacks {
            cb(&value);
        }
    }

    pub fn fail(&self, error: TickLoomError) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            inner.state = State::Failed(error.clone());
            std::mem::take(&mut inner.on_failure)
        };
        for cb in callbacks {
            cb(&error);
        }
    }

    /// Registers a success continuation. If already completed, it runs
    /// immediately on the calling "thread" (there is only ever one).
    pub fn on_success(&self, f: impl FnOnce(&T) + 'static) {
        let mut inner = self.inner.borrow_mut();
        match &inner.state {
            State::Completed(value) => {
                let value = value.clone();
                drop(inner);
                f(&value);
            }
            State::Pending => inner.on_success.push(Box::new(f)),
            State::Failed(_) => {}
        }
    }

    pub fn on_failure(&self, f: impl FnOnce(&TickLoomError) + 'static) {
        let mut inner = self.inner.borrow_mut();
        match &inner.state {
            State::Failed(error) => {
                let error = error.clone();
                drop(inner);
                f(&error);
            }
            State::Pending => inner.on_failure.push(Box::new(f)),
            State::Completed(_) => {}
        }
    }

    /// Registers a continuation that runs on either outcome.
    pub fn handle(&self, f: impl Fn(Option<&T>, Option<&TickLoomError>) + 'static) {
        let f_ok = Rc::new(f);
        let f_err = Rc::clone(&f_ok);
        self.on_success(move |v| f_ok(Some(v), None));
        self.on_failure(move |e| f_err(None, Some(e)));
    }

    /// Chains a transformation, returning a new future that completes
    /// when `f`'s returned future does. Failure propagates untouched.
    pub fn and_then<U: Clone + 'static>(
        &self,
        f: impl FnOnce(&T) -> ListenableFuture<U> + 'static,
    ) -> ListenableFuture<U> {
        let chained = ListenableFuture::<U>::new();

        let chained_ok = chained.clone();
        self.on_success(move |value| {
            let next = f(value);
            let bridge_ok = chained_ok.clone();
            next.on_success(move |v| bridge_ok.complete(v.clone()));
            let bridge_err = chained_ok.clone();
            next.on_failure(move |e| bridge_err.fail(e.clone()));
        });

        let chained_err = chained.clone();
        self.on_failure(move |e| chained_err.fail(e.clone()));

        chained
    }

    pub fn is_completed(&self) -> bool {
        !matches!(self.inner.borrow().state, State::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.inner.borrow().state, State::Failed(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().state, State::Pending)
    }

    pub fn result(&self) -> Option<T> {
        match &self.inner.borrow().state {
            State::Completed(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<TickLoomError> {
        match &self.inner.borrow().state {
            State::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }
}
