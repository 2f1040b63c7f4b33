//! Interruption masking and the external abort signal.
//!
//! Interruption in this crate is a first-class protocol, not a silent stop.
//! A run executes with asynchronous interruption *deferred* by default; the
//! only places it can land are unmask windows opened explicitly through the
//! effect context. This module defines the run-wide policy, the shared
//! signal an outside party raises, and the window bookkeeping.
//!
//! # Policies
//!
//! - [`MaskPolicy::Deferred`]: interruptible points are opt-in. The signal
//!   is observed only inside an unmask window.
//! - [`MaskPolicy::Uninterruptible`]: the whole run defers interruption,
//!   even inside unmask windows. Strictest safety; used by the
//!   uninterruptible runner entry points.
//!
//! # Cooperative delivery
//!
//! Raising the signal never preempts anything. A run that reaches no unmask
//! window observes nothing; the signal is checked at instruction boundaries
//! the run itself opts into.

use core::fmt;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// The run-wide interruption policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaskPolicy {
    /// Interruption is deferred except inside unmask windows.
    #[default]
    Deferred,
    /// Interruption is deferred for the whole run, unmask windows included.
    Uninterruptible,
}

/// The kind of abort request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbortKind {
    /// Explicit abort requested by user code.
    User,
    /// Abort due to a deadline elapsing outside the run.
    Timeout,
    /// Abort due to host shutdown.
    Shutdown,
}

impl fmt::Display for AbortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// The reason for an abort request, including kind and optional context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortReason {
    /// The kind of abort.
    pub kind: AbortKind,
    /// Optional human-readable message (static for determinism).
    pub message: Option<&'static str>,
}

impl AbortReason {
    /// Creates a new abort reason with the given kind.
    #[must_use]
    pub const fn new(kind: AbortKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a user abort reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: AbortKind::User,
            message: Some(message),
        }
    }

    /// Creates a timeout abort reason.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(AbortKind::Timeout)
    }

    /// Creates a shutdown abort reason.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self::new(AbortKind::Shutdown)
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message {
            Some(msg) => write!(f, "{} ({msg})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Default)]
struct SignalInner {
    raised: AtomicBool,
    reason: Mutex<Option<AbortReason>>,
}

/// A shared flag an external party flips to request interruption of a run.
///
/// The handle is cheap to clone and safe to raise from any thread. Raising
/// is sticky and first-reason-wins: later raises keep the original reason.
/// The run observes the signal only at its own interruption points.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    inner: Arc<SignalInner>,
}

impl AbortSignal {
    /// Creates a new, unraised signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests interruption with the given reason.
    ///
    /// The first reason to arrive wins; subsequent raises are no-ops.
    pub fn raise(&self, reason: AbortReason) {
        let mut slot = self.inner.reason.lock();
        if slot.is_none() {
            tracing::debug!(reason = %reason, "abort signal raised");
            *slot = Some(reason);
            self.inner.raised.store(true, Ordering::Release);
        }
    }

    /// Returns true if interruption has been requested.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::Acquire)
    }

    /// Returns the abort reason, if the signal has been raised.
    #[must_use]
    pub fn reason(&self) -> Option<AbortReason> {
        self.inner.reason.lock().clone()
    }
}

/// Depth counter for open unmask windows.
///
/// Shared between the context and its window guards so that the guard can
/// restore the count even if the window body panics.
#[derive(Debug, Clone, Default)]
pub(crate) struct UnmaskDepth {
    depth: Rc<Cell<u32>>,
}

impl UnmaskDepth {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns true if at least one unmask window is open.
    pub(crate) fn is_open(&self) -> bool {
        self.depth.get() > 0
    }

    /// Opens a window, returning a guard that closes it on drop.
    pub(crate) fn open(&self) -> UnmaskWindow {
        self.depth.set(self.depth.get() + 1);
        UnmaskWindow {
            depth: self.depth.clone(),
        }
    }
}

/// Guard that restores the unmask depth on drop.
pub(crate) struct UnmaskWindow {
    depth: Rc<Cell<u32>>,
}

impl Drop for UnmaskWindow {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}
