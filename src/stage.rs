//! The pipeline stage representation and its driver.
//!
//! A [`Stage`] is a resumable unit of pipeline computation: a tree of
//! nodes where every transfer of control is explicit. The four node kinds
//! are the whole engine interface the rest of the crate builds on:
//!
//! - [`Request`](Stage::Request): the upstream composition point, suspending
//!   until the neighbour supplies an input value
//! - [`Respond`](Stage::Respond): the downstream composition point, handing a
//!   value down and suspending until asked again
//! - [`Action`](Stage::Action): run one checked action against the effect
//!   context, then continue
//! - [`Done`](Stage::Done): the stage finished with a return value
//!
//! # Composition
//!
//! [`compose`] connects a stage's respond point to its neighbour's request
//! point, pull-style: the downstream side is in control, and the upstream
//! side runs only far enough to answer each request. When either side
//! finishes, the other is abandoned mid-suspension; any cleanup it armed
//! stays in the finalizer registry for the enclosing scope to drain. The
//! composite returns the value of whichever side finished.
//!
//! # Failure propagation
//!
//! A failing [`Action`](Stage::Action) node short-circuits the whole run as
//! an `Err` value. [`catch`] is a structural transform: it rewrites every
//! action node of a stage tree, so a matching failure raised by *any* stage
//! folded into a composite is observable by a handler wrapped around an
//! ancestor, not only by the immediately wrapped stage.
//!
//! # Purity discipline
//!
//! Continuation closures are constructors, not effects: all host I/O must
//! go through an action node (via [`lift`] or the scoping combinators), so
//! that suspending, resuming, and rewriting a tree never performs I/O.

use std::convert::Infallible;
use std::rc::Rc;

use crate::cx::Cx;
use crate::error::{Error, ErrorMatch, Result};

/// Continuation resumed with the answer to a request.
pub type ResumeWith<I, O, R> = Box<dyn FnOnce(I) -> Stage<I, O, R>>;

/// Continuation resumed when the neighbour asks for the next value.
pub type Resume<I, O, R> = Box<dyn FnOnce() -> Stage<I, O, R>>;

/// One checked action against the effect context.
pub type ActionFn<I, O, R> = Box<dyn FnOnce(&mut Cx) -> Result<Stage<I, O, R>>>;

/// A closed stage: no composition point reaches the outside.
pub type Effect<R> = Stage<Infallible, Infallible, R>;

/// A stage that only sends values downstream.
pub type Producer<O, R> = Stage<Infallible, O, R>;

/// A stage that only receives values from upstream.
pub type Consumer<I, R> = Stage<I, Infallible, R>;

/// A resumable unit of pipeline computation.
///
/// `I` is the type received from upstream, `O` the type sent downstream,
/// and `R` the stage's return value.
pub enum Stage<I, O, R> {
    /// Ask upstream for the next input value.
    Request(ResumeWith<I, O, R>),
    /// Hand a value downstream; resume when the consumer asks again.
    Respond(O, Resume<I, O, R>),
    /// Run a checked action, then continue with the stage it returns.
    Action(ActionFn<I, O, R>),
    /// The stage finished.
    Done(R),
}

impl<I: 'static, O: 'static, R: 'static> Stage<I, O, R> {
    /// Sequences another stage after this one, passing the return value on.
    #[must_use]
    pub fn and_then<S: 'static>(
        self,
        next: impl FnOnce(R) -> Stage<I, O, S> + 'static,
    ) -> Stage<I, O, S> {
        match self {
            Self::Done(r) => next(r),
            Self::Request(resume) => Stage::Request(Box::new(move |i| resume(i).and_then(next))),
            Self::Respond(o, resume) => {
                Stage::Respond(o, Box::new(move || resume().and_then(next)))
            }
            Self::Action(step) => Stage::Action(Box::new(move |cx| Ok(step(cx)?.and_then(next)))),
        }
    }

    /// Maps the stage's return value.
    #[must_use]
    pub fn map<S: 'static>(self, f: impl FnOnce(R) -> S + 'static) -> Stage<I, O, S> {
        self.and_then(move |r| Stage::Done(f(r)))
    }
}

/// Embeds a base effect as a single-action stage.
pub fn lift<I, O, T>(action: impl FnOnce(&mut Cx) -> Result<T> + 'static) -> Stage<I, O, T>
where
    I: 'static,
    O: 'static,
    T: 'static,
{
    Stage::Action(Box::new(move |cx| Ok(Stage::Done(action(cx)?))))
}

/// A stage that fails with the given error.
pub fn throw<I, O, R>(err: Error) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    Stage::Action(Box::new(move |_cx| Err(err)))
}

/// Suspends at the upstream composition point, returning the next input.
#[must_use]
pub fn request<I, O>() -> Stage<I, O, I>
where
    I: 'static,
    O: 'static,
{
    Stage::Request(Box::new(Stage::Done))
}

/// Suspends at the downstream composition point after handing `value` down.
#[must_use]
pub fn respond<I, O>(value: O) -> Stage<I, O, ()>
where
    I: 'static,
    O: 'static,
{
    Stage::Respond(value, Box::new(|| Stage::Done(())))
}

/// Connects `up`'s respond point to `down`'s request point.
///
/// Pull-based: `down` is in control and `up` advances only to answer each
/// request. The composite finishes with the return value of whichever side
/// finishes first, abandoning the other mid-suspension.
#[must_use]
pub fn compose<I, M, O, R>(up: Stage<I, M, R>, down: Stage<M, O, R>) -> Stage<I, O, R>
where
    I: 'static,
    M: 'static,
    O: 'static,
    R: 'static,
{
    match down {
        Stage::Done(r) => Stage::Done(r),
        Stage::Respond(o, resume) => Stage::Respond(o, Box::new(move || compose(up, resume()))),
        Stage::Action(step) => Stage::Action(Box::new(move |cx| Ok(compose(up, step(cx)?)))),
        Stage::Request(deliver) => feed(up, deliver),
    }
}

/// Advances `up` until it can answer the pending request `deliver`.
fn feed<I, M, O, R>(up: Stage<I, M, R>, deliver: ResumeWith<M, O, R>) -> Stage<I, O, R>
where
    I: 'static,
    M: 'static,
    O: 'static,
    R: 'static,
{
    match up {
        Stage::Done(r) => Stage::Done(r),
        Stage::Respond(m, resume) => compose(resume(), deliver(m)),
        Stage::Action(step) => Stage::Action(Box::new(move |cx| Ok(feed(step(cx)?, deliver)))),
        Stage::Request(resume) => Stage::Request(Box::new(move |i| feed(resume(i), deliver))),
    }
}

/// Runs `stage`; a failure selected by `matcher` is replaced by `handler`.
///
/// This is a structural transform over the whole tree: every action node is
/// rewritten, so failures from any stage already folded into `stage` by
/// [`compose`] are intercepted. A failure the matcher rejects re-raises
/// unchanged. The handler's replacement stage is not itself guarded.
#[must_use]
pub fn catch<I, O, R>(
    stage: Stage<I, O, R>,
    matcher: impl Into<ErrorMatch>,
    handler: impl Fn(Error) -> Stage<I, O, R> + 'static,
) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    catch_shared(stage, matcher.into(), Rc::new(handler))
}

/// [`catch`] with the stage last, for call sites that lead with recovery.
#[must_use]
pub fn handle<I, O, R>(
    matcher: impl Into<ErrorMatch>,
    handler: impl Fn(Error) -> Stage<I, O, R> + 'static,
    stage: Stage<I, O, R>,
) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    catch(stage, matcher, handler)
}

type SharedHandler<I, O, R> = Rc<dyn Fn(Error) -> Stage<I, O, R>>;

fn catch_shared<I, O, R>(
    stage: Stage<I, O, R>,
    matcher: ErrorMatch,
    handler: SharedHandler<I, O, R>,
) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    match stage {
        Stage::Done(r) => Stage::Done(r),
        Stage::Request(resume) => {
            Stage::Request(Box::new(move |i| catch_shared(resume(i), matcher, handler)))
        }
        Stage::Respond(o, resume) => {
            Stage::Respond(o, Box::new(move || catch_shared(resume(), matcher, handler)))
        }
        Stage::Action(step) => Stage::Action(Box::new(move |cx| match step(cx) {
            Ok(next) => Ok(catch_shared(next, matcher, handler)),
            Err(err) if matcher.matches(&err) => {
                tracing::trace!(error = %err, "failure intercepted by catch");
                Ok(handler(err))
            }
            Err(err) => Err(err),
        })),
    }
}

/// Drives a closed stage to completion against the effect context.
pub(crate) fn run_stage<R: 'static>(cx: &mut Cx, stage: Effect<R>) -> Result<R> {
    let mut current = stage;
    loop {
        match current {
            Stage::Done(r) => return Ok(r),
            Stage::Action(step) => current = step(cx)?,
            Stage::Request(_) => {
                return Err(Error::internal("request surfaced in a closed pipeline"))
            }
            Stage::Respond(never, _) => match never {},
        }
    }
}
