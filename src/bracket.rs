//! Scope registration and the bracket family.
//!
//! These combinators guarantee that a cleanup action runs on every way out
//! of a computation: normal return, explicit failure, or abandonment by a
//! neighbouring pipeline stage. Two mechanisms cooperate:
//!
//! - [`register`] wires a cleanup action into the finalizer registry around
//!   every composition point a stage performs, so abandonment while the
//!   stage is suspended leaves the action armed for the enclosing scope's
//!   drain.
//! - a structural [`catch`] arm runs the same action when the stage's own
//!   code fails explicitly.
//!
//! The two firing paths are mutually exclusive: a stage cannot be suspended
//! at a composition point (armed) and executing its own failing action
//! (caught) at the same moment. Cleanup therefore fires exactly once
//! without requiring idempotence from the caller.
//!
//! # Cross-wiring
//!
//! Registration is deliberately crossed: before a stage *responds*, its
//! cleanup is armed on the **upstream** stack; before it *requests*, on the
//! **downstream** stack. Whichever side of the pipeline is suspended at the
//! moment of abort is the side whose list holds the cleanup. The entry is
//! disarmed as soon as the composition point returns normally, so cleanup
//! is armed only while control could actually be stuck past it.
//!
//! # Ordering
//!
//! Nested brackets release innermost-first on every exit path: the registry
//! drains most-recently-armed first, and the explicit-failure path unwinds
//! handlers innermost-first as the failure value propagates outward.

use crate::error::{ErrorMatch, Result};
use crate::registry::{shared_finalizer, FinalizerFn, Side};
use crate::stage::{catch, Stage};

/// Wires `cleanup` into the registry around every composition point of
/// `stage`.
///
/// This is the registration primitive: it does not react to explicit
/// failures. Most callers want [`on_abort`] or [`finally`].
#[must_use]
pub fn register<I, O, R>(
    cleanup: impl FnMut() -> Result<()> + 'static,
    stage: Stage<I, O, R>,
) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    arm(stage, shared_finalizer(cleanup))
}

/// Runs `after` if and only if `stage` does not return normally.
///
/// Abandonment by a neighbouring stage fires it through the registry
/// drain; an explicit failure fires it just before the failure re-raises.
/// A normal return never fires it.
#[must_use]
pub fn on_abort<I, O, R>(
    after: impl FnMut() -> Result<()> + 'static,
    stage: Stage<I, O, R>,
) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    on_abort_shared(shared_finalizer(after), stage)
}

/// Runs `after` exactly once on every exit path of `stage`.
///
/// The abort paths are covered as in [`on_abort`]; a normal return runs
/// `after` as a checked action. The paths are mutually exclusive, so the
/// action still fires exactly once.
#[must_use]
pub fn finally<I, O, R>(
    stage: Stage<I, O, R>,
    after: impl FnMut() -> Result<()> + 'static,
) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    let action = shared_finalizer(after);
    let on_return = action.clone();
    on_abort_shared(action, stage).and_then(move |r| {
        Stage::Action(Box::new(move |cx| {
            cx.check(|| (&mut *on_return.borrow_mut())())?;
            Ok(Stage::Done(r))
        }))
    })
}

/// Acquire a resource, use it, release it on every exit path.
///
/// Acquisition runs unchecked (interruption is irrelevant there); if it
/// fails, no cleanup runs. The resource is handed to `use_fn` and, cloned,
/// to every release firing; shared-handle resources (`Rc`-wrapped state)
/// are the intended shape.
#[must_use]
pub fn bracket<Res, I, O, R>(
    acquire: impl FnOnce() -> Result<Res> + 'static,
    release: impl FnMut(Res) -> Result<()> + 'static,
    use_fn: impl FnOnce(Res) -> Stage<I, O, R> + 'static,
) -> Stage<I, O, R>
where
    Res: Clone + 'static,
    I: 'static,
    O: 'static,
    R: 'static,
{
    let mut release = release;
    Stage::Action(Box::new(move |cx| {
        let resource = cx.lift_host(acquire)?;
        let handle = resource.clone();
        Ok(finally(use_fn(resource), move || release(handle.clone())))
    }))
}

/// [`bracket`] for setup and teardown that share no resource value.
#[must_use]
pub fn bracket_<I, O, R>(
    before: impl FnOnce() -> Result<()> + 'static,
    after: impl FnMut() -> Result<()> + 'static,
    stage: Stage<I, O, R>,
) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    Stage::Action(Box::new(move |cx| {
        cx.lift_host(before)?;
        Ok(finally(stage, after))
    }))
}

/// [`bracket`] that releases only when the use computation aborts.
///
/// A normal return keeps the resource: the caller takes over ownership of
/// its teardown (the commit/rollback shape).
#[must_use]
pub fn bracket_on_abort<Res, I, O, R>(
    acquire: impl FnOnce() -> Result<Res> + 'static,
    release: impl FnMut(Res) -> Result<()> + 'static,
    use_fn: impl FnOnce(Res) -> Stage<I, O, R> + 'static,
) -> Stage<I, O, R>
where
    Res: Clone + 'static,
    I: 'static,
    O: 'static,
    R: 'static,
{
    let mut release = release;
    Stage::Action(Box::new(move |cx| {
        let resource = cx.lift_host(acquire)?;
        let handle = resource.clone();
        Ok(on_abort(move || release(handle.clone()), use_fn(resource)))
    }))
}

/// Runs `stage` in its own finalizer scope.
///
/// Cleanup left armed by stages abandoned inside runs when this scope
/// exits, on every exit path, instead of waiting for the end of the run.
#[must_use]
pub fn scoped<I, O, R>(stage: Stage<I, O, R>) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    Stage::Action(Box::new(move |cx| {
        cx.registry_mut().push_scope();
        let guarded = catch(stage, ErrorMatch::any(), |err| {
            Stage::Action(Box::new(move |cx| {
                if let Err(drain) = cx.registry_mut().pop_scope() {
                    tracing::warn!(
                        error = %drain,
                        "scope drain failure overshadowed by pipeline failure"
                    );
                }
                Err(err)
            }))
        });
        Ok(guarded.and_then(|r| {
            Stage::Action(Box::new(move |cx| {
                cx.registry_mut().pop_scope()?;
                Ok(Stage::Done(r))
            }))
        }))
    }))
}

fn on_abort_shared<I, O, R>(action: FinalizerFn, stage: Stage<I, O, R>) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    let on_failure = action.clone();
    catch(arm(stage, action), ErrorMatch::any(), move |err| {
        let action = on_failure.clone();
        Stage::Action(Box::new(move |_cx| {
            (&mut *action.borrow_mut())()?;
            Err(err)
        }))
    })
}

/// Arms `action` around every composition point `stage` performs.
fn arm<I, O, R>(stage: Stage<I, O, R>, action: FinalizerFn) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    match stage {
        Stage::Done(r) => Stage::Done(r),
        Stage::Action(step) => Stage::Action(Box::new(move |cx| Ok(arm(step(cx)?, action)))),
        Stage::Respond(value, resume) => Stage::Action(Box::new(move |cx| {
            cx.registry_mut().install(Side::Upstream, action.clone());
            Ok(Stage::Respond(
                value,
                Box::new(move || {
                    Stage::Action(Box::new(move |cx| {
                        cx.registry_mut().remove(Side::Upstream);
                        Ok(arm(resume(), action))
                    }))
                }),
            ))
        })),
        Stage::Request(resume) => Stage::Action(Box::new(move |cx| {
            cx.registry_mut().install(Side::Downstream, action.clone());
            Ok(Stage::Request(Box::new(move |input| {
                Stage::Action(Box::new(move |cx| {
                    cx.registry_mut().remove(Side::Downstream);
                    Ok(arm(resume(input), action))
                }))
            })))
        })),
    }
}
