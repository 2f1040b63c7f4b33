//! Weir: cancel-correct resource scoping for streaming pipelines.
//!
//! # Overview
//!
//! Weir guarantees that every resource acquired inside a composable
//! streaming pipeline is released exactly once, in a deterministic order,
//! no matter how the pipeline ends: normal completion, an explicit
//! failure, early termination by a neighbouring stage, or an abort signal
//! raised from outside the run.
//!
//! Three mechanisms cooperate:
//!
//! - **Interruption masking**: a run defers external interruption by
//!   default; it can land only inside unmask windows the run opens itself,
//!   so no cleanup sequence is ever corrupted mid-flight.
//! - **The finalizer registry**: per-run, per-direction stacks of armed
//!   cleanup actions that mirror pipeline composition, drained by the
//!   enclosing scope when a stage is abandoned.
//! - **The bracket family**: [`bracket`], [`finally`], [`on_abort`] and
//!   friends, which wire acquire/use/release scoping through the registry
//!   and the structural failure channel so that nesting and chaining both
//!   preserve reverse-acquisition release order.
//!
//! # Core Guarantees
//!
//! - **Exactly-once release**: the registry path (abandonment) and the
//!   failure path (explicit error) are mutually exclusive
//! - **Deterministic order**: release order follows registration and scope
//!   nesting, never abort timing
//! - **No unwinding**: failures and captured interruptions propagate as
//!   values, recoverable with [`catch`]/[`handle`] anywhere up the
//!   composition
//! - **Cooperative interruption**: aborts land only at opted-in points
//!
//! # Module Structure
//!
//! - [`mask`]: mask policy, abort signal, unmask windows
//! - [`error`]: the captured failure model and selective matching
//! - [`cx`]: the effect context threaded through a run
//! - [`stage`]: the stage representation, composition, and structural catch
//! - [`bracket`]: scope registration and the bracket family
//! - [`runner`]: end-to-end entry points
//! - [`fs`]: line-based file stages built on the bracket family
//!
//! # Example
//!
//! ```
//! use weir::{compose, fs, try_run, AbortSignal};
//!
//! # fn demo() -> weir::Result<()> {
//! let pipe = compose(fs::read_lines("input.txt"), fs::write_lines("copy.txt"));
//! try_run(AbortSignal::new(), pipe)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod bracket;
pub mod cx;
pub mod error;
pub mod fs;
pub mod mask;
mod registry;
pub mod runner;
pub mod stage;

pub use bracket::{bracket, bracket_, bracket_on_abort, finally, on_abort, register, scoped};
pub use cx::Cx;
pub use error::{Error, ErrorKind, ErrorMatch, Result};
pub use mask::{AbortKind, AbortReason, AbortSignal, MaskPolicy};
pub use runner::{run, run_uninterruptible, try_run, try_run_uninterruptible};
pub use stage::{
    catch, compose, handle, lift, request, respond, throw, Consumer, Effect, Producer, Stage,
};
