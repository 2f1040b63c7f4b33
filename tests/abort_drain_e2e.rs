//! Abort and drain end-to-end tests.
//!
//! Exercises the interruption protocol through whole runs: deferral by
//! default, delivery at unmask windows, the uninterruptible variant, and
//! the guarantee that abandoned stages get their cleanup drained no matter
//! which side of the pipeline was suspended.

mod common;

use common::*;

use weir::{
    compose, finally, lift, request, respond, run, throw, try_run, try_run_uninterruptible,
    AbortReason, AbortSignal, Consumer, Error, Producer, Stage,
};

fn counting_producer(log: &EventLog) -> Producer<i32, ()> {
    finally(emit(0), record(log, "producer-release"))
}

fn emit(n: i32) -> Producer<i32, ()> {
    respond(n).and_then(move |()| emit(n + 1))
}

// ============================================================================
// Deferral and delivery
// ============================================================================

#[test]
fn masked_run_completes_despite_a_raised_signal() {
    init_test_logging();
    let signal = AbortSignal::new();
    signal.raise(AbortReason::user("too late"));
    // No unmask window anywhere: the run cannot observe the signal.
    let stage = lift(|cx| cx.check(|| Ok::<_, Error>(123)));
    let value = try_run(signal, stage).expect("masked run must finish");
    assert_eq!(value, 123);
}

#[test]
fn signal_raised_from_another_thread_lands_at_the_next_window() {
    init_test_logging();
    let signal = AbortSignal::new();
    let remote = signal.clone();
    std::thread::spawn(move || remote.raise(AbortReason::shutdown()))
        .join()
        .expect("raiser thread panicked");
    let stage = lift(|cx| cx.unmasked_io(|| Ok::<_, Error>(())));
    let err = try_run(signal, stage).expect_err("window must observe the signal");
    assert!(err.is_interrupted());
}

#[test]
fn uninterruptible_variant_finishes_cleanup_heavy_runs() {
    init_test_logging();
    let log = event_log();
    let signal = AbortSignal::new();
    signal.raise(AbortReason::timeout());
    let stage = finally(
        lift(|cx| cx.unmasked_io(|| Ok::<_, Error>("all done"))),
        record(&log, "after"),
    );
    let value = try_run_uninterruptible(signal, stage).expect("must not observe signal");
    assert_eq!(value, "all done");
    assert_eq!(events(&log), vec!["after"]);
}

// ============================================================================
// Drains under abandonment
// ============================================================================

#[test]
fn producer_cleanup_drains_when_consumer_is_interrupted() {
    init_test_logging();
    let log = event_log();
    let signal = AbortSignal::new();
    let raiser = signal.clone();
    let producer = counting_producer(&log);
    // The consumer raises the signal itself, then opens a window.
    let consumer: Consumer<i32, ()> = request().and_then(move |_: i32| {
        lift(move |cx| {
            cx.check(|| {
                raiser.raise(AbortReason::user("stop"));
                Ok::<_, Error>(())
            })?;
            cx.unmasked_io(|| Ok::<_, Error>(()))
        })
    });
    let err = try_run(signal, compose(producer, consumer)).expect_err("must interrupt");
    assert!(err.is_interrupted());
    assert_eq!(events(&log), vec!["producer-release"]);
}

#[test]
fn consumer_cleanup_drains_when_producer_fails() {
    init_test_logging();
    let log = event_log();
    let producer: Producer<i32, ()> =
        respond(1).and_then(|()| throw(Error::app("source-dried")));
    let consumer = finally(drain_all(), record(&log, "consumer-release"));
    let err =
        try_run(AbortSignal::new(), compose(producer, consumer)).expect_err("must propagate");
    assert_eq!(err.tag(), Some("source-dried"));
    assert_eq!(events(&log), vec!["consumer-release"]);
}

#[test]
fn both_sides_drain_most_recent_first_on_interruption() {
    init_test_logging();
    let log = event_log();
    let signal = AbortSignal::new();
    let raiser = signal.clone();
    let producer = finally(emit(0), record(&log, "producer-release"));
    let middle = finally(forward(), record(&log, "middle-release"));
    let consumer: Consumer<i32, ()> = request().and_then(move |_: i32| {
        lift(move |cx| {
            raiser.raise(AbortReason::user("stop"));
            cx.unmasked_io(|| Ok::<_, Error>(()))
        })
    });
    let pipe = compose(compose(producer, middle), consumer);
    let err = try_run(signal, pipe).expect_err("must interrupt");
    assert!(err.is_interrupted());
    // The middle stage registered later than the producer, so it drains
    // first.
    assert_eq!(events(&log), vec!["middle-release", "producer-release"]);
}

#[test]
fn run_surfaces_interruption_as_io_error_after_draining() {
    init_test_logging();
    let log = event_log();
    let signal = AbortSignal::new();
    signal.raise(AbortReason::timeout());
    let stage = finally(
        lift(|cx| cx.unmasked_io(|| Ok::<_, Error>(()))),
        record(&log, "after"),
    );
    let err = run(signal, stage).expect_err("must interrupt");
    assert_eq!(err.kind(), std::io::ErrorKind::Interrupted);
    assert_eq!(events(&log), vec!["after"]);
}

fn forward() -> Stage<i32, i32, ()> {
    request().and_then(|value: i32| respond(value).and_then(|()| forward()))
}

fn drain_all() -> Consumer<i32, ()> {
    request().and_then(|_: i32| drain_all())
}
