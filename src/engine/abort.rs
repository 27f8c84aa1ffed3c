//! Abort signals and the lifecycle capability.
//!
//! An [`AbortController`] owns one cancellable epoch. Anything that should
//! stop when the epoch ends (bus subscriptions, event listeners) registers
//! against its [`AbortSignal`].
//!
//! [`Lifecycle`] is the capability elements compose: it hands out the current
//! signal, aborts it when the element leaves the document, and can be reset
//! with [`Lifecycle::cleanup`] to start a fresh epoch while still mounted.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::primitives::Cleanup;

// =============================================================================
// AbortSignal
// =============================================================================

struct SignalInner {
    aborted: Cell<bool>,
    listeners: RefCell<Vec<Cleanup>>,
}

/// Read side of an [`AbortController`]. Cheap to clone.
#[derive(Clone)]
pub struct AbortSignal {
    inner: Rc<SignalInner>,
}

impl AbortSignal {
    fn new() -> Self {
        Self {
            inner: Rc::new(SignalInner {
                aborted: Cell::new(false),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Has the owning controller aborted?
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.get()
    }

    /// Run `callback` once when the signal aborts.
    ///
    /// Runs immediately if the signal has already aborted.
    pub fn on_abort(&self, callback: impl FnOnce() + 'static) {
        if self.is_aborted() {
            callback();
            return;
        }
        self.inner.listeners.borrow_mut().push(Box::new(callback));
    }

    /// Do both handles observe the same epoch?
    pub fn same_epoch(&self, other: &AbortSignal) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn abort(&self) {
        if self.inner.aborted.replace(true) {
            return;
        }
        // Listeners may register more listeners or abort other signals.
        let listeners = std::mem::take(&mut *self.inner.listeners.borrow_mut());
        for listener in listeners {
            listener();
        }
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

// =============================================================================
// AbortController
// =============================================================================

/// Owner of one cancellable epoch.
#[derive(Debug)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            signal: AbortSignal::new(),
        }
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Abort the epoch. Idempotent.
    pub fn abort(&self) {
        self.signal.abort();
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Abort-on-disconnect capability held by every element.
#[derive(Debug, Default)]
pub struct Lifecycle {
    controller: AbortController,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal for the current epoch.
    pub fn acquire(&self) -> AbortSignal {
        self.controller.signal()
    }

    /// Abort the current epoch and start a fresh one.
    pub fn cleanup(&mut self) {
        self.controller.abort();
        self.controller = AbortController::new();
    }

    /// The element left the document.
    pub fn disconnect(&self) {
        self.controller.abort();
    }

    /// The element (re-)entered the document. Re-arms after a disconnect.
    pub fn connect(&mut self) {
        if self.controller.signal.is_aborted() {
            self.controller = AbortController::new();
        }
    }
}
