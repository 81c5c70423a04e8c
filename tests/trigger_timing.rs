//! Timing tests for Trigger pacing
//!
//! Run serially: achieved rates are sensitive to other busy test threads.

mod common;

use common::mock_helpers::{CallRecorder, CounterSource};
use framechain::config::TriggerSettings;
use framechain::pipeline::stages::Trigger;
use framechain::{FrameChainError, Graph, Pipeline, Stage, StageContext, Tape};
use serial_test::serial;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pulls per second over the recorded call instants.
fn achieved_rate(calls: &[Instant]) -> f64 {
    let (Some(first), Some(last)) = (calls.first(), calls.last()) else {
        return 0.0;
    };
    let span = last.duration_since(*first).as_secs_f64();
    if span == 0.0 {
        return 0.0;
    }
    (calls.len() - 1) as f64 / span
}

#[test]
#[serial]
fn test_fixed_rate_within_ten_percent() {
    let graph = Graph::new();
    let (recorder, calls) = CallRecorder::new(Duration::ZERO);

    let mut chain = Pipeline::new(&graph);
    chain.add(recorder);
    chain.add(Trigger::new(10.0));
    chain.start(false).unwrap();

    std::thread::sleep(Duration::from_millis(1550));
    chain.stop();
    chain.wait(Some(common::test_timeout()));

    let instants: Vec<Instant> = calls.try_iter().collect();
    let rate = achieved_rate(&instants);
    assert!(
        (9.0..=11.0).contains(&rate),
        "expected ~10 Hz, got {:.2} Hz over {} calls",
        rate,
        instants.len()
    );
}

#[test]
#[serial]
fn test_slow_predecessor_lowers_rate_without_error() {
    let graph = Graph::new();
    let (recorder, calls) = CallRecorder::new(Duration::from_millis(100));

    let trigger = Arc::new(Trigger::new(30.0));
    let mut chain = Pipeline::new(&graph);
    chain.add(recorder);
    chain.add_arc(trigger.clone());
    chain.start(false).unwrap();

    std::thread::sleep(Duration::from_millis(1050));
    let tape = chain.pull();
    chain.stop();
    assert!(!trigger.wait(Some(common::test_timeout())));

    assert_eq!(tape.text(-1), Some("tick"));
    let instants: Vec<Instant> = calls.try_iter().collect();
    let rate = achieved_rate(&instants);
    assert!(
        (8.0..=10.5).contains(&rate),
        "expected the predecessor's ~10 Hz, got {:.2} Hz",
        rate
    );
    assert_eq!(trigger.iterations(), instants.len() as u64);
}

#[test]
#[serial]
fn test_unpaced_trigger_from_settings() {
    let settings = TriggerSettings {
        rate_hz: 0.0,
        report_interval_secs: 0,
    };
    let trigger = Trigger::from_settings(&settings);
    assert!(trigger.period().is_none());

    let graph = Graph::new();
    let trigger = Arc::new(trigger);
    let mut chain = Pipeline::new(&graph);
    chain.add(CounterSource::new());
    chain.add_arc(trigger.clone());
    chain.start(false).unwrap();

    assert!(common::wait_until(common::test_timeout(), || trigger.iterations() > 100));
    chain.stop();
    assert!(!chain.wait(Some(common::test_timeout())));
}

#[test]
fn test_start_without_predecessor_is_config_error() {
    let graph = Graph::new();
    let mut chain = Pipeline::new(&graph);
    chain.add(Trigger::new(5.0));

    let err = chain.start(false).unwrap_err();
    assert!(matches!(err, FrameChainError::MissingPredecessor { .. }));
    assert!(err.is_config());
    assert!(!chain.is_running());
}

#[test]
fn test_unstarted_trigger_appends_absent() {
    let trigger = Trigger::new(5.0);
    let tape = trigger.call(&StageContext::standalone(), Tape::new().with("x"));
    assert_eq!(tape.len(), 2);
    assert!(tape.get(-1).unwrap().is_absent());
}
