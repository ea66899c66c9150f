//! Single-assignment results with continuations.

use crate::error::{Error, ErrorKind, Result};
use crate::runtime::EventLoop;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

/// Lifecycle of a [`Future`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FutureState {
    Pending,
    Resolved,
    Rejected,
    Canceled,
}

type Continuation<T> = Box<dyn FnOnce(&Future<T>)>;

struct FutureInner<T> {
    event_loop: EventLoop,
    state: Cell<FutureState>,
    value: RefCell<Option<T>>,
    error: Cell<Option<ErrorKind>>,
    continuations: RefCell<Vec<Continuation<T>>>,
}

/// A result that is settled exactly once, bound to an [`EventLoop`].
///
/// A future starts [`Pending`](FutureState::Pending) and moves to exactly
/// one terminal state through [`resolve`](Self::resolve),
/// [`reject`](Self::reject) or [`cancel`](Self::cancel).
///
/// Continuations registered with [`then`](Self::then) are dispatched
/// differently depending on when they are registered:
///
/// - while pending, they run synchronously inside the settling call, in
///   registration order;
/// - once settled, they are posted to the loop and run on a later tick,
///   never before `then` returns.
///
/// This is not a [`std::future::Future`]; it is driven by callbacks, not
/// by polling.
pub struct Future<T> {
    inner: Rc<FutureInner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Future<T> {
    /// Creates a pending future bound to `event_loop`.
    pub fn new(event_loop: &EventLoop) -> Self {
        Self {
            inner: Rc::new(FutureInner {
                event_loop: event_loop.clone(),
                state: Cell::new(FutureState::Pending),
                value: RefCell::new(None),
                error: Cell::new(None),
                continuations: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Registers a continuation.
    pub fn then<F>(&self, continuation: F)
    where
        F: FnOnce(&Future<T>) + 'static,
    {
        if self.is_pending() {
            self.inner
                .continuations
                .borrow_mut()
                .push(Box::new(continuation));
        } else {
            let this = self.clone();
            self.inner.event_loop.post(move || continuation(&this));
        }
    }

    /// Settles the future with `value`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the future is already settled; nothing
    /// runs in that case.
    pub fn resolve(&self, value: T) -> Result<()> {
        self.ensure_pending()?;
        *self.inner.value.borrow_mut() = Some(value);
        self.settle(FutureState::Resolved)
    }

    /// Settles the future with an error.
    pub fn reject(&self, error: ErrorKind) -> Result<()> {
        self.ensure_pending()?;
        self.inner.error.set(Some(error));
        self.settle(FutureState::Rejected)
    }

    /// Settles the future as canceled, recording `reason`.
    pub fn cancel(&self, reason: ErrorKind) -> Result<()> {
        self.ensure_pending()?;
        self.inner.error.set(Some(reason));
        self.settle(FutureState::Canceled)
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(Error::InvalidState("future already settled"))
        }
    }

    fn settle(&self, state: FutureState) -> Result<()> {
        self.inner.state.set(state);

        let chain = mem::take(&mut *self.inner.continuations.borrow_mut());
        for continuation in chain {
            continuation(self);
        }

        Ok(())
    }
}

impl<T> Future<T> {
    pub fn state(&self) -> FutureState {
        self.inner.state.get()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == FutureState::Pending
    }

    /// Returns a copy of the resolved value.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless the future is resolved.
    pub fn value(&self) -> Result<T>
    where
        T: Clone,
    {
        self.with_value(T::clone)
    }

    /// Runs `f` on the resolved value without copying it.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        if self.state() != FutureState::Resolved {
            return Err(Error::InvalidState("future is not resolved"));
        }

        self.inner
            .value
            .borrow()
            .as_ref()
            .map(f)
            .ok_or(Error::Internal("resolved future has no value"))
    }

    /// Returns the rejection error or cancellation reason.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless the future is rejected or canceled.
    pub fn error(&self) -> Result<ErrorKind> {
        match self.state() {
            FutureState::Rejected | FutureState::Canceled => self
                .inner
                .error
                .get()
                .ok_or(Error::Internal("settled future has no error")),
            _ => Err(Error::InvalidState("future has no error")),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("state", &self.state())
            .field("error", &self.inner.error.get())
            .finish()
    }
}
