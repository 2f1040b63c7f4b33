//! Error types and failure-capture strategy.
//!
//! Every failure in this crate propagates as a value: a computation that
//! fails evaluates to `Err(Error)` instead of unwinding, so enclosing
//! combinators can still run cleanup before the failure surfaces. Error
//! handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Synchronous failures and captured interruptions share one representation
//! - Selective recovery goes through a typed match, never downcasting
//!
//! # Error Kinds
//!
//! - **Interrupted**: an external abort signal observed at an unmask window
//! - **Host**: a host I/O action failed
//! - **App**: raised explicitly by pipeline code via [`throw`](crate::stage::throw)
//! - **Finalizer**: a cleanup action failed while a scope was draining
//! - **Internal**: a pipeline invariant was violated (bug)

use core::fmt;
use std::sync::Arc;

/// A specialized result type for pipeline operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An external abort signal was observed at an interruption point.
    Interrupted,
    /// A host I/O action failed.
    Host,
    /// An application failure raised explicitly by pipeline code.
    App,
    /// A cleanup action failed while its scope was draining.
    Finalizer,
    /// An internal invariant was violated (bug).
    Internal,
}

impl ErrorKind {
    /// Returns a human-readable name for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interrupted => "interrupted",
            Self::Host => "host",
            Self::App => "app",
            Self::Finalizer => "finalizer",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The captured form of a pipeline failure.
///
/// An `Error` carries the identity of the original failure so that a
/// [`catch`](crate::stage::catch) further up the composition can decide
/// whether it handles it. Application errors additionally carry a static
/// tag, which keeps two distinct `App` failures distinguishable.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    tag: Option<&'static str>,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            tag: None,
            message: None,
            source: None,
        }
    }

    /// Creates an application error carrying an identifying tag.
    #[must_use]
    pub const fn app(tag: &'static str) -> Self {
        Self {
            kind: ErrorKind::App,
            tag: Some(tag),
            message: None,
            source: None,
        }
    }

    /// Creates an interruption error from an observed abort reason.
    #[must_use]
    pub fn interrupted(reason: &crate::mask::AbortReason) -> Self {
        Self::new(ErrorKind::Interrupted).with_message(format!("{reason}"))
    }

    /// Creates an internal invariant-violation error.
    #[must_use]
    pub fn internal(msg: &'static str) -> Self {
        Self::new(ErrorKind::Internal).with_message(msg)
    }

    /// Wraps a failure raised by a cleanup action during a scope drain.
    #[must_use]
    pub fn finalizer(cause: Self) -> Self {
        Self::new(ErrorKind::Finalizer).with_source(cause)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the application tag, if any.
    #[must_use]
    pub const fn tag(&self) -> Option<&'static str> {
        self.tag
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true if this error represents a captured interruption.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.kind, ErrorKind::Interrupted)
    }

    /// Returns true if this error came from a failing cleanup action.
    #[must_use]
    pub const fn is_finalizer(&self) -> bool {
        matches!(self.kind, ErrorKind::Finalizer)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(tag) = self.tag {
            write!(f, " [{tag}]")?;
        }
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Host).with_source(err)
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err.kind() {
            ErrorKind::Interrupted => std::io::ErrorKind::Interrupted,
            _ => std::io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

/// A typed "does this failure match?" predicate for selective recovery.
///
/// [`catch`](crate::stage::catch) re-raises any failure this predicate
/// rejects, which is how unrelated failures pass through a specific handler
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMatch {
    /// Matches errors of one kind.
    Kind(ErrorKind),
    /// Matches application errors carrying this tag.
    Tag(&'static str),
    /// Matches every error.
    Any,
}

impl ErrorMatch {
    /// Matches errors of the given kind.
    #[must_use]
    pub const fn kind(kind: ErrorKind) -> Self {
        Self::Kind(kind)
    }

    /// Matches application errors carrying the given tag.
    #[must_use]
    pub const fn tag(tag: &'static str) -> Self {
        Self::Tag(tag)
    }

    /// Matches every error.
    #[must_use]
    pub const fn any() -> Self {
        Self::Any
    }

    /// Returns true if the predicate selects the given error.
    #[must_use]
    pub fn matches(&self, err: &Error) -> bool {
        match self {
            Self::Kind(kind) => err.kind() == *kind,
            Self::Tag(tag) => err.tag() == Some(tag),
            Self::Any => true,
        }
    }
}

impl From<ErrorKind> for ErrorMatch {
    fn from(kind: ErrorKind) -> Self {
        Self::Kind(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Kind and predicate tests
    // =========================================================================

    #[test]
    fn kind_accessor() {
        let err = Error::new(ErrorKind::Host);
        assert_eq!(err.kind(), ErrorKind::Host);
        assert!(!err.is_interrupted());
    }

    #[test]
    fn app_errors_carry_their_tag() {
        let err = Error::app("missing-key");
        assert_eq!(err.kind(), ErrorKind::App);
        assert_eq!(err.tag(), Some("missing-key"));
    }

    #[test]
    fn finalizer_wraps_the_original_failure() {
        let cause = Error::app("flush");
        let err = Error::finalizer(cause);
        assert!(err.is_finalizer());
        assert!(std::error::Error::source(&err).is_some());
    }

    // =========================================================================
    // ErrorMatch tests
    // =========================================================================

    #[test]
    fn match_by_kind() {
        let m = ErrorMatch::kind(ErrorKind::App);
        assert!(m.matches(&Error::app("x")));
        assert!(!m.matches(&Error::new(ErrorKind::Host)));
    }

    #[test]
    fn match_by_tag_rejects_other_tags() {
        let m = ErrorMatch::tag("left");
        assert!(m.matches(&Error::app("left")));
        assert!(!m.matches(&Error::app("right")));
        assert!(!m.matches(&Error::new(ErrorKind::App)));
    }

    #[test]
    fn match_any_accepts_everything() {
        let m = ErrorMatch::any();
        assert!(m.matches(&Error::new(ErrorKind::Internal)));
        assert!(m.matches(&Error::app("x")));
    }

    // =========================================================================
    // Conversion tests
    // =========================================================================

    #[test]
    fn io_error_becomes_host_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::from(io);
        assert_eq!(err.kind(), ErrorKind::Host);
    }

    #[test]
    fn interrupted_round_trips_to_io_interrupted() {
        let reason = crate::mask::AbortReason::user("stop");
        let io = std::io::Error::from(Error::interrupted(&reason));
        assert_eq!(io.kind(), std::io::ErrorKind::Interrupted);
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::new(ErrorKind::Host).with_message("read failed");
        let text = format!("{err}");
        assert!(text.contains("host"));
        assert!(text.contains("read failed"));
    }
}
