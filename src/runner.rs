//! Entry points for executing a pipeline end-to-end.
//!
//! The runner owns everything with run lifetime: it picks the mask policy,
//! builds the effect context, brackets the whole computation in one
//! top-level finalizer scope, and drains that scope on every exit path.
//! Finalizers registered anywhere during the run therefore execute even if
//! nothing explicitly scoped them.
//!
//! # Variants
//!
//! | entry point                 | policy                          |
//! |-----------------------------|---------------------------------|
//! | [`try_run`] / [`run`]       | [`MaskPolicy::Deferred`]        |
//! | [`try_run_uninterruptible`] / [`run_uninterruptible`] | [`MaskPolicy::Uninterruptible`] |
//!
//! `try_run` returns the captured failure for inspection; `run` converts it
//! into the host's native failure kind (`std::io::Error`). This conversion
//! is the only point where a captured failure re-enters the host's error
//! world.

use crate::cx::Cx;
use crate::error::Result;
use crate::mask::{AbortSignal, MaskPolicy};
use crate::stage::{run_stage, Effect};

/// Runs a closed pipeline under the deferred-interruption policy.
///
/// Interruption raised on `signal` is observable inside unmask windows;
/// everywhere else it stays pending. All finalizers registered during the
/// run are drained before this returns.
///
/// # Errors
///
/// Returns the captured failure: the computation's own, or, if the
/// computation succeeded, the first finalizer failure from the final
/// drain.
pub fn try_run<R: 'static>(signal: AbortSignal, stage: Effect<R>) -> Result<R> {
    run_with_policy(MaskPolicy::Deferred, signal, stage)
}

/// Runs a closed pipeline with interruption deferred for the whole run.
///
/// The strictest variant: unmask windows open but never observe the
/// signal, so no interruption can land anywhere.
///
/// # Errors
///
/// As [`try_run`].
pub fn try_run_uninterruptible<R: 'static>(signal: AbortSignal, stage: Effect<R>) -> Result<R> {
    run_with_policy(MaskPolicy::Uninterruptible, signal, stage)
}

/// [`try_run`], converting a captured failure into the host's error kind.
///
/// # Errors
///
/// Returns the captured failure as a [`std::io::Error`]; a captured
/// interruption maps to [`std::io::ErrorKind::Interrupted`].
pub fn run<R: 'static>(signal: AbortSignal, stage: Effect<R>) -> std::io::Result<R> {
    try_run(signal, stage).map_err(Into::into)
}

/// [`try_run_uninterruptible`], converting a captured failure into the
/// host's error kind.
///
/// # Errors
///
/// As [`run`].
pub fn run_uninterruptible<R: 'static>(
    signal: AbortSignal,
    stage: Effect<R>,
) -> std::io::Result<R> {
    try_run_uninterruptible(signal, stage).map_err(Into::into)
}

fn run_with_policy<R: 'static>(
    policy: MaskPolicy,
    signal: AbortSignal,
    stage: Effect<R>,
) -> Result<R> {
    tracing::debug!(?policy, "pipeline run starting");
    let mut cx = Cx::new(policy, signal);
    cx.registry_mut().push_scope();
    let outcome = run_stage(&mut cx, stage);
    let drained = cx.registry_mut().pop_scope();
    debug_assert!(
        cx.registry_mut().is_empty(),
        "finalizer registry not fully drained at run exit"
    );
    match outcome {
        Ok(value) => {
            tracing::debug!("pipeline run finished");
            drained.map(|()| value)
        }
        Err(err) => {
            if let Err(drain_err) = drained {
                tracing::warn!(
                    error = %drain_err,
                    "final drain failure overshadowed by pipeline failure"
                );
            }
            tracing::debug!(error = %err, "pipeline run failed");
            Err(err)
        }
    }
}
