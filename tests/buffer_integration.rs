//! Integration tests for Buffer rate decoupling
//!
//! These tests validate:
//! - The caller never waits on the wrapped stage once it is warm
//! - Outputs only move forward (latest input wins, stale ones are dropped)
//! - Warm-up blocks for the first output only when nothing is upstream
//! - Fallback entries fill in while a buffer is still cold
//! - A failed or stopped worker never leaves a caller waiting

mod common;

use common::mock_helpers::{counter_of, CounterSource, Panicking, SlowEcho};
use framechain::pipeline::stages::{Buffer, Fallback, FallbackEntry};
use framechain::{Graph, Pipeline, Stage, StageContext, Tape};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_outputs_are_monotonic_and_stale_inputs_dropped() {
    let graph = Graph::new();
    let buffer = Arc::new(Buffer::new(SlowEcho::new(Duration::from_millis(20))));

    let mut chain = Pipeline::new(&graph);
    chain.add(CounterSource::new());
    chain.add_arc(buffer.clone());
    chain.start(false).unwrap();

    let mut seen = Vec::new();
    let mut pulls = 0u64;
    let started = Instant::now();
    while started.elapsed() < Duration::from_millis(400) {
        let tape = chain.pull();
        pulls += 1;
        assert_eq!(tape.len(), 2, "one input plus one contribution per pull");
        if let Some(n) = tape.text(-1).filter(|t| t.starts_with("seen:")).and_then(counter_of) {
            seen.push(n);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    chain.stop();
    chain.wait(Some(common::test_timeout()));

    assert!(!seen.is_empty(), "buffer never produced an output");
    assert!(
        seen.windows(2).all(|w| w[0] <= w[1]),
        "outputs went backwards: {:?}",
        seen
    );

    let stats = buffer.stats();
    assert_eq!(stats.staged, pulls);
    assert!(
        stats.completed < stats.staged,
        "expected dropped inputs, got {:?}",
        stats
    );
}

#[test]
fn test_warm_call_returns_without_waiting() {
    let graph = Graph::new();
    let mut chain = Pipeline::new(&graph);
    chain.add(CounterSource::new());
    chain.add(Buffer::new(SlowEcho::new(Duration::from_millis(200))));
    chain.start(false).unwrap();

    let started = Instant::now();
    for _ in 0..20 {
        chain.pull();
    }
    assert!(
        started.elapsed() < Duration::from_millis(200),
        "pulls waited on the wrapped stage: {:?}",
        started.elapsed()
    );
    chain.stop();
}

#[test]
fn test_warm_up_waits_for_first_output_when_nothing_upstream() {
    let graph = Graph::new();
    let mut chain = Pipeline::new(&graph);
    chain.add(Buffer::new(SlowEcho::new(Duration::from_millis(100))));
    chain.start(false).unwrap();

    let started = Instant::now();
    let tape = chain.pull();
    let elapsed = started.elapsed();

    assert_eq!(tape.text(-1), Some("seen:nothing"));
    assert!(elapsed >= Duration::from_millis(90), "returned too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "warm-up took {:?}", elapsed);

    chain.stop();
    assert!(!chain.wait(Some(common::test_timeout())));
}

#[test]
fn test_cold_buffer_answers_with_fallback_entries() {
    let graph = Graph::new();
    let mut chain = Pipeline::new(&graph);
    chain.add(CounterSource::new());
    chain.add(
        Buffer::new(SlowEcho::new(Duration::from_secs(2))).with_fallback(Fallback::entries([
            FallbackEntry::Copy(-1),
            FallbackEntry::Text("warming".to_string()),
            FallbackEntry::Absent,
        ])),
    );
    chain.start(false).unwrap();

    let tape = chain.pull();
    assert_eq!(tape.len(), 4);
    assert_eq!(tape.text(0), Some("1"));
    assert_eq!(tape.text(1), Some("1"));
    assert_eq!(tape.text(2), Some("warming"));
    assert!(tape.get(3).unwrap().is_absent());

    chain.stop();
}

#[test]
fn test_stopped_buffer_keeps_answering_with_last_output() {
    let graph = Graph::new();
    let buffer = Arc::new(Buffer::new(SlowEcho::new(Duration::from_millis(5))));
    let mut chain = Pipeline::new(&graph);
    chain.add(CounterSource::new());
    chain.add_arc(buffer.clone());
    chain.start(false).unwrap();

    assert!(common::wait_until(common::test_timeout(), || {
        chain.pull();
        buffer.is_warm()
    }));
    chain.stop();
    assert!(!buffer.wait(Some(common::test_timeout())));

    let tape = chain.pull();
    assert!(tape.text(-1).is_some_and(|t| t.starts_with("seen:")));
    assert!(!buffer.has_failed());
}

#[test]
fn test_panicking_stage_fails_buffer_and_releases_warm_up() {
    let graph = Graph::new();
    let buffer = Arc::new(Buffer::new(Panicking));
    let mut chain = Pipeline::new(&graph);
    chain.add_arc(buffer.clone());
    chain.start(false).unwrap();

    let started = Instant::now();
    let tape = chain.pull();
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "warm-up outlived the worker: {:?}",
        started.elapsed()
    );
    assert_eq!(tape.len(), 1);
    assert!(tape.get(-1).unwrap().is_absent());

    assert!(buffer.has_failed());
    assert!(
        buffer.last_error().is_some_and(|e| e.contains("panicked")),
        "unexpected last error: {:?}",
        buffer.last_error()
    );
    assert!(!buffer.wait(Some(common::test_timeout())));

    // Later pulls answer at once instead of waiting on the dead worker.
    let started = Instant::now();
    let tape = chain.pull();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(tape.get(-1).unwrap().is_absent());

    chain.stop();
}

#[test]
fn test_stop_releases_caller_waiting_for_first_output() {
    let graph = Graph::new();
    let buffer = Arc::new(Buffer::new(SlowEcho::new(Duration::from_secs(2))));
    let mut chain = Pipeline::new(&graph);
    chain.add_arc(buffer.clone());
    chain.start(false).unwrap();

    let waiting = buffer.clone();
    let (tx, rx) = crossbeam_channel::bounded(1);
    let caller = std::thread::spawn(move || {
        let tape = waiting.call(&StageContext::standalone(), Tape::new());
        let _ = tx.send(tape);
    });

    std::thread::sleep(Duration::from_millis(100));
    assert!(rx.try_recv().is_err(), "caller did not wait for the first output");

    buffer.stop();
    let tape = rx
        .recv_timeout(Duration::from_secs(1))
        .expect("stop left the caller waiting");
    caller.join().unwrap();

    assert_eq!(tape.len(), 1);
    assert!(tape.get(-1).unwrap().is_absent());
    assert!(!buffer.has_failed());
    chain.stop();
}
