#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

use weir::Result;

static INIT_LOGGING: Once = Once::new();

/// Initialize tracing output for a test binary. Safe to call repeatedly.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace")),
            )
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// An order-of-events log shared between test closures.
pub type EventLog = Rc<RefCell<Vec<&'static str>>>;

/// Creates an empty event log.
pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// A cleanup action that appends `name` to the log.
pub fn record(log: &EventLog, name: &'static str) -> impl FnMut() -> Result<()> + 'static {
    let log = log.clone();
    move || {
        log.borrow_mut().push(name);
        Ok(())
    }
}

/// Snapshot of the log contents.
pub fn events(log: &EventLog) -> Vec<&'static str> {
    log.borrow().clone()
}
