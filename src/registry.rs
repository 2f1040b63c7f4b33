//! The per-run finalizer registry.
//!
//! The registry holds the cleanup actions that are *armed*: registered
//! against a composition point that control has passed across and not yet
//! returned from. It is a pair of stacks, one per pipeline direction,
//! carried by the effect context for the whole run.
//!
//! # Invariants
//!
//! - Every scope pushes one [`Marker`](FinalizerEntry::Marker) onto both
//!   stacks at entry and drains both stacks down to (and including) its
//!   marker at exit, so the two stacks always agree on the depth of open
//!   scopes.
//! - Entries are stacked: the most recently registered action is on top and
//!   is the first to run during a drain. Nested resources therefore release
//!   in reverse acquisition order.
//! - The registry must be empty when the run's top-level scope has popped.
//!
//! # Drain policy
//!
//! A failing finalizer does not stop the drain. The first failure is
//! reported upward wrapped as [`ErrorKind::Finalizer`](crate::error::ErrorKind);
//! later failures in the same drain are logged at `warn` and suppressed.

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// A pending cleanup action.
///
/// Shared so the same action can be armed at successive composition points
/// without cloning the underlying closure.
pub(crate) type FinalizerFn = Rc<RefCell<dyn FnMut() -> Result<()>>>;

/// Wraps a cleanup closure into the shared form the registry stores.
pub(crate) fn shared_finalizer(action: impl FnMut() -> Result<()> + 'static) -> FinalizerFn {
    Rc::new(RefCell::new(action))
}

/// The pipeline direction a finalizer is armed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    /// The input side: armed while control is suspended past a respond.
    Upstream,
    /// The output side: armed while control is suspended past a request.
    Downstream,
}

impl Side {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        }
    }
}

/// One slot on a registry stack.
pub(crate) enum FinalizerEntry {
    /// Scope boundary sentinel.
    Marker,
    /// An armed cleanup action.
    Pending(FinalizerFn),
}

type EntryStack = SmallVec<[FinalizerEntry; 8]>;

/// The two direction stacks of armed finalizers for one run.
#[derive(Default)]
pub(crate) struct FinalizerRegistry {
    upstream: EntryStack,
    downstream: EntryStack,
}

impl FinalizerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Opens a scope: pushes a boundary marker onto both stacks.
    pub(crate) fn push_scope(&mut self) {
        tracing::debug!("finalizer scope opened");
        self.upstream.push(FinalizerEntry::Marker);
        self.downstream.push(FinalizerEntry::Marker);
    }

    /// Closes the innermost scope, running every armed action in it.
    ///
    /// Both stacks drain down to their nearest marker, most recently
    /// registered action first, upstream side before downstream side. All
    /// actions run even if some fail; only the first failure is reported.
    pub(crate) fn pop_scope(&mut self) -> Result<()> {
        tracing::debug!("finalizer scope draining");
        let mut first_failure = None;
        Self::drain_to_marker(&mut self.upstream, Side::Upstream, &mut first_failure);
        Self::drain_to_marker(&mut self.downstream, Side::Downstream, &mut first_failure);
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Arms a cleanup action on the given side.
    pub(crate) fn install(&mut self, side: Side, action: FinalizerFn) {
        tracing::trace!(side = side.as_str(), "finalizer armed");
        self.stack_mut(side).push(FinalizerEntry::Pending(action));
    }

    /// Disarms the most recently armed action on the given side.
    pub(crate) fn remove(&mut self, side: Side) {
        tracing::trace!(side = side.as_str(), "finalizer disarmed");
        let _removed = self.stack_mut(side).pop();
        debug_assert!(
            matches!(_removed, Some(FinalizerEntry::Pending(_))),
            "finalizer removal crossed a scope boundary"
        );
    }

    /// Returns true if both stacks are empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.upstream.is_empty() && self.downstream.is_empty()
    }

    /// Number of armed (non-marker) entries on one side.
    #[cfg(test)]
    pub(crate) fn armed_on(&self, side: Side) -> usize {
        let stack = match side {
            Side::Upstream => &self.upstream,
            Side::Downstream => &self.downstream,
        };
        stack
            .iter()
            .filter(|entry| matches!(entry, FinalizerEntry::Pending(_)))
            .count()
    }

    fn stack_mut(&mut self, side: Side) -> &mut EntryStack {
        match side {
            Side::Upstream => &mut self.upstream,
            Side::Downstream => &mut self.downstream,
        }
    }

    fn drain_to_marker(stack: &mut EntryStack, side: Side, first_failure: &mut Option<Error>) {
        while let Some(entry) = stack.pop() {
            match entry {
                FinalizerEntry::Marker => break,
                FinalizerEntry::Pending(action) => {
                    if let Err(err) = (&mut *action.borrow_mut())() {
                        if first_failure.is_some() {
                            tracing::warn!(
                                side = side.as_str(),
                                error = %err,
                                "finalizer failure suppressed during drain"
                            );
                        } else {
                            *first_failure = Some(Error::finalizer(err));
                        }
                    }
                }
            }
        }
    }
}
