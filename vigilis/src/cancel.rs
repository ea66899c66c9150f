//! Cooperative cancellation.

use crate::error::ErrorKind;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

type Cleanup = Box<dyn FnOnce(ErrorKind)>;

#[derive(Default)]
struct CancelInner {
    reason: Cell<Option<ErrorKind>>,
    cleanups: RefCell<Vec<Cleanup>>,
}

/// A one-shot cancellation signal with cleanup callbacks.
///
/// Cleanups registered with [`register`](Self::register) run once, when
/// the token is first triggered, most recently registered first. Nothing
/// is canceled automatically: owners decide what a cleanup does, such as
/// canceling a [`Future`](crate::Future) or closing a
/// [`Stream`](crate::Stream).
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Rc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cleanup. It runs immediately if the token already fired.
    pub fn register<F>(&self, cleanup: F)
    where
        F: FnOnce(ErrorKind) + 'static,
    {
        match self.inner.reason.get() {
            Some(reason) => cleanup(reason),
            None => self.inner.cleanups.borrow_mut().push(Box::new(cleanup)),
        }
    }

    /// Fires the token with `reason`.
    ///
    /// Returns `false` if it had already fired; the original reason is kept.
    pub fn trigger(&self, reason: ErrorKind) -> bool {
        if self.inner.reason.get().is_some() {
            return false;
        }

        self.inner.reason.set(Some(reason));
        tracing::debug!(reason = %reason, "cancel token triggered");

        let cleanups = mem::take(&mut *self.inner.cleanups.borrow_mut());
        for cleanup in cleanups.into_iter().rev() {
            cleanup(reason);
        }

        true
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// The reason given to [`trigger`](Self::trigger), if it fired.
    pub fn reason(&self) -> Option<ErrorKind> {
        self.inner.reason.get()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .field("cleanups", &self.inner.cleanups.borrow().len())
            .finish()
    }
}
