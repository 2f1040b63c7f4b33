//! The effect context for a pipeline run.
//!
//! `Cx` is the token that grants a stage access to the run's capabilities:
//! executing host I/O under the interruption mask, opening unmask windows,
//! and (internally) the finalizer registry. One `Cx` exists per run and is
//! threaded `&mut` through every action; there is no ambient or
//! thread-local state.
//!
//! # Interruption points
//!
//! Every externally-visible effect funnels through [`Cx::check`]. A checked
//! action observes the abort signal only when the run's policy is
//! [`Deferred`](MaskPolicy::Deferred) *and* an unmask window is open; in
//! every other configuration the signal stays pending until a later
//! interruption point. Failures never unwind: a failing or interrupted
//! action evaluates to `Err`, leaving the caller free to run cleanup.

use crate::error::{Error, Result};
use crate::mask::{AbortSignal, MaskPolicy, UnmaskDepth};
use crate::registry::FinalizerRegistry;

/// The capability context threaded through a pipeline run.
///
/// Constructed by the runner; stage code receives `&mut Cx` inside
/// [`lift`](crate::stage::lift) closures and uses it to execute host
/// actions.
pub struct Cx {
    policy: MaskPolicy,
    unmask: UnmaskDepth,
    signal: AbortSignal,
    registry: FinalizerRegistry,
}

impl Cx {
    pub(crate) fn new(policy: MaskPolicy, signal: AbortSignal) -> Self {
        Self {
            policy,
            unmask: UnmaskDepth::new(),
            signal,
            registry: FinalizerRegistry::new(),
        }
    }

    /// Returns the run's mask policy.
    #[must_use]
    pub const fn policy(&self) -> MaskPolicy {
        self.policy
    }

    /// Returns true if an abort observed now would be delivered.
    #[must_use]
    pub fn interruptible(&self) -> bool {
        self.policy == MaskPolicy::Deferred && self.unmask.is_open()
    }

    /// Executes a host action under the current mask policy.
    ///
    /// If the context is interruptible and the abort signal is raised, the
    /// action does not run and an [`Interrupted`](crate::error::ErrorKind)
    /// failure is captured instead. A failure from the action itself is
    /// captured as a value.
    ///
    /// # Errors
    ///
    /// Returns the captured interruption or the action's own failure.
    pub fn check<T, E>(&mut self, action: impl FnOnce() -> Result<T, E>) -> Result<T>
    where
        E: Into<Error>,
    {
        if self.interruptible() {
            if let Some(reason) = self.signal.reason() {
                tracing::debug!(reason = %reason, "interruption delivered at unmask window");
                return Err(Error::interrupted(&reason));
            }
        }
        action().map_err(Into::into)
    }

    /// Executes a host action without ever observing interruption.
    ///
    /// Used where interruption is intentionally irrelevant: resource
    /// acquisition and deterministic setup actions.
    ///
    /// # Errors
    ///
    /// Returns the action's own failure, captured as a value.
    pub fn lift_host<T, E>(&mut self, action: impl FnOnce() -> Result<T, E>) -> Result<T>
    where
        E: Into<Error>,
    {
        action().map_err(Into::into)
    }

    /// Runs `body` with interruption re-enabled, restoring deferral after.
    ///
    /// Nested windows are counted; the window survives a panicking body
    /// (the depth is restored by a drop guard). Under
    /// [`MaskPolicy::Uninterruptible`] the window opens but checked actions
    /// still defer, so the whole run stays uninterruptible.
    ///
    /// # Errors
    ///
    /// Propagates whatever `body` returns.
    pub fn unmasked<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let _window = self.unmask.open();
        body(self)
    }

    /// Executes one host action inside its own unmask window.
    ///
    /// This is the opt-in interruptible point: equivalent to
    /// `cx.unmasked(|cx| cx.check(action))`.
    ///
    /// # Errors
    ///
    /// Returns the captured interruption or the action's own failure.
    pub fn unmasked_io<T, E>(&mut self, action: impl FnOnce() -> Result<T, E>) -> Result<T>
    where
        E: Into<Error>,
    {
        self.unmasked(|cx| cx.check(action))
    }

    pub(crate) fn registry_mut(&mut self) -> &mut FinalizerRegistry {
        &mut self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::AbortReason;

    fn cx(policy: MaskPolicy) -> (Cx, AbortSignal) {
        let signal = AbortSignal::new();
        (Cx::new(policy, signal.clone()), signal)
    }

    // =========================================================================
    // Mask policy tests
    // =========================================================================

    #[test]
    fn masked_check_defers_a_raised_signal() {
        let (mut cx, signal) = cx(MaskPolicy::Deferred);
        signal.raise(AbortReason::user("stop"));
        let value = cx.check(|| Ok::<_, Error>(7)).expect("masked check must run");
        assert_eq!(value, 7);
    }

    #[test]
    fn unmasked_io_observes_a_raised_signal() {
        let (mut cx, signal) = cx(MaskPolicy::Deferred);
        signal.raise(AbortReason::user("stop"));
        let err = cx
            .unmasked_io(|| Ok::<_, Error>(7))
            .expect_err("unmasked check must capture interruption");
        assert!(err.is_interrupted());
    }

    #[test]
    fn unmasked_io_runs_when_signal_is_quiet() {
        let (mut cx, _signal) = cx(MaskPolicy::Deferred);
        let value = cx.unmasked_io(|| Ok::<_, Error>(3)).expect("quiet signal");
        assert_eq!(value, 3);
    }

    #[test]
    fn uninterruptible_policy_ignores_unmask_windows() {
        let (mut cx, signal) = cx(MaskPolicy::Uninterruptible);
        signal.raise(AbortReason::shutdown());
        let value = cx
            .unmasked_io(|| Ok::<_, Error>(11))
            .expect("uninterruptible run must not observe the signal");
        assert_eq!(value, 11);
    }

    #[test]
    fn deferral_is_restored_after_the_window() {
        let (mut cx, signal) = cx(MaskPolicy::Deferred);
        cx.unmasked(|cx| {
            assert!(cx.interruptible());
            Ok(())
        })
        .expect("window body failed");
        assert!(!cx.interruptible());
        signal.raise(AbortReason::timeout());
        // Outside the window the raised signal is deferred again.
        cx.check(|| Ok::<_, Error>(()))
            .expect("masked check after window must run");
    }

    #[test]
    fn nested_windows_stay_interruptible() {
        let (mut cx, signal) = cx(MaskPolicy::Deferred);
        signal.raise(AbortReason::user("stop"));
        let err = cx
            .unmasked(|cx| cx.unmasked_io(|| Ok::<_, Error>(())))
            .expect_err("nested window must observe the signal");
        assert!(err.is_interrupted());
    }

    // =========================================================================
    // Capture tests
    // =========================================================================

    #[test]
    fn host_failure_is_captured_as_a_value() {
        let (mut cx, _signal) = cx(MaskPolicy::Deferred);
        let err = cx
            .check(|| Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "boom")))
            .expect_err("host failure must surface");
        assert_eq!(err.kind(), crate::error::ErrorKind::Host);
    }

    #[test]
    fn lift_host_never_observes_the_signal() {
        let (mut cx, signal) = cx(MaskPolicy::Deferred);
        signal.raise(AbortReason::user("stop"));
        let value = cx
            .unmasked(|cx| cx.lift_host(|| Ok::<_, Error>(5)))
            .expect("lift_host runs even inside a window");
        assert_eq!(value, 5);
    }
}
