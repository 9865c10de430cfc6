//! Integration tests for the reader state machine
//!
//! These tests validate reconnect behaviour end to end:
//! - Open failures followed by a successful connect
//! - Link loss while connected
//! - Fatal errors with auto-reconnect disabled
//! - Stopping while waiting out the backoff

mod common;

use common::builders::ConfigBuilder;
use common::wait_until;
use serialvis::backend::{ScriptStep, ScriptedLineSource, StreamBackend};
use serialvis::types::{ReaderState, Record};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

fn sequences(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(Record::as_sample)
        .map(|s| s.source_sequence)
        .collect()
}

#[test]
fn test_reconnects_after_open_failures_and_link_loss() {
    let config = ConfigBuilder::new().reconnect(true).build();
    let source = ScriptedLineSource::new()
        .with_failing_opens(2)
        .push(ScriptStep::Line("DAT,1,0,1".to_string()))
        .push(ScriptStep::ReadError("device unplugged".to_string()))
        .push(ScriptStep::Line("DAT,2,10,2".to_string()));
    let attempts = source.open_attempts();

    let (backend, frontend) = StreamBackend::new(config, Box::new(source));
    let handle = backend.spawn().unwrap();

    let mut records = Vec::new();
    assert!(wait_until(|| {
        records.extend(frontend.drain());
        records.len() == 2
    }));
    handle.stop();
    handle.join().unwrap();

    assert_eq!(sequences(&records), vec![1, 2]);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);

    assert_eq!(
        frontend.states(),
        vec![
            ReaderState::Disconnected,
            ReaderState::Disconnected,
            ReaderState::Connected,
            ReaderState::Disconnected,
            ReaderState::Connected,
            ReaderState::Stopping,
            ReaderState::Stopped,
        ]
    );

    let stats = frontend.stats();
    assert_eq!(stats.open_failures, 2);
    assert_eq!(stats.connection_losses, 1);
    assert_eq!(stats.samples, 2);
}

#[test]
fn test_open_failure_without_reconnect_is_fatal() {
    let config = ConfigBuilder::new().reconnect(false).build();
    let source = ScriptedLineSource::from_lines(["DAT,1,0,1"]).with_failing_opens(1);
    let attempts = source.open_attempts();

    let (backend, frontend) = StreamBackend::new(config, Box::new(source));
    let err = backend.spawn().unwrap().join().unwrap_err();

    assert!(err.is_transport());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(frontend.drain().is_empty());
    assert_eq!(
        frontend.states(),
        vec![ReaderState::Stopping, ReaderState::Stopped]
    );
    assert_eq!(frontend.stats().open_failures, 1);
}

#[test]
fn test_link_loss_without_reconnect_is_fatal() {
    let config = ConfigBuilder::new().reconnect(false).build();
    let source = ScriptedLineSource::from_lines(["DAT,1,0,1", "DAT,2,10,2"])
        .push(ScriptStep::ReadError("device unplugged".to_string()))
        .push(ScriptStep::Line("DAT,3,20,3".to_string()));

    let (backend, frontend) = StreamBackend::new(config, Box::new(source));
    let err = backend.spawn().unwrap().join().unwrap_err();

    assert!(err.is_transport());
    assert!(err.to_string().contains("device unplugged"));
    assert_eq!(sequences(&frontend.drain()), vec![1, 2]);
    assert_eq!(frontend.stats().connection_losses, 1);
}

#[test]
fn test_stop_during_backoff_is_prompt() {
    let mut config = ConfigBuilder::new().reconnect(true).build();
    config.serial.reconnect_backoff_ms = 10_000;
    let source = ScriptedLineSource::new().with_failing_opens(usize::MAX);
    let attempts = source.open_attempts();

    let (backend, frontend) = StreamBackend::new(config, Box::new(source));
    let handle = backend.spawn().unwrap();
    assert!(wait_until(|| attempts.load(Ordering::SeqCst) >= 1));

    let started = Instant::now();
    handle.stop();
    handle.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(frontend.states().last(), Some(&ReaderState::Stopped));
}
