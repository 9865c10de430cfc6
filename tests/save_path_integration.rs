//! Integration tests for `--save` resolution feeding the CSV sink

mod common;

use common::builders::{header_line, imu_lines, ConfigBuilder};
use common::wait_until;
use serialvis::backend::{ScriptedLineSource, StreamBackend};
use serialvis::config::resolve_save_path;

#[test]
fn test_directory_argument_gets_timestamped_log() {
    let dir = tempfile::tempdir().unwrap();
    let raw = format!("{}/", dir.path().join("logs").display());

    let path = resolve_save_path(&raw).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();

    assert_eq!(path.parent().unwrap(), dir.path().join("logs"));
    assert!(name.starts_with("log_"), "unexpected name {}", name);
    assert!(name.ends_with(".csv"));
    // log_YYYYmmdd-HHMMSS.csv
    assert_eq!(name.len(), "log_20240101-000000.csv".len());
}

#[test]
fn test_repeated_resolution_never_reuses_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("run.csv");
    let raw = raw.to_str().unwrap();

    let first = resolve_save_path(raw).unwrap();
    std::fs::write(&first, "").unwrap();
    let second = resolve_save_path(raw).unwrap();

    assert_ne!(first, second);
    assert!(!second.exists());
}

#[test]
fn test_resolved_path_receives_rows() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("capture");
    let path = resolve_save_path(raw.to_str().unwrap()).unwrap();
    assert_eq!(path.extension().unwrap(), "csv");

    let config = ConfigBuilder::new().save_to(&path).build();
    let mut lines = vec![header_line(&["ax", "ay", "az"])];
    lines.extend(imu_lines(5));

    let (backend, frontend) =
        StreamBackend::new(config, Box::new(ScriptedLineSource::from_lines(lines)));
    let handle = backend.spawn().unwrap();
    assert!(wait_until(|| frontend.receiver.len() == 6));
    handle.stop();
    handle.join().unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let mut rows = content.lines();
    assert_eq!(rows.next(), Some("src_seq,t_ms,ax,ay,az"));
    assert_eq!(rows.count(), 5);
}
