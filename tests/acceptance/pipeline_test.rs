//! Capture → log pipeline acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Only raw hardware timestamps reach the log, in receive order
//! - Frames without a timestamp and failed receives do not stop capture
//! - Records buffered at shutdown are logged before the log worker exits
//! - The log is numbered from 0 with the `SequenceNr;TimeInNs` header

use super::common::{read_log, ts, Frame, ScriptedSource};
use hwts_common::TimestampRecord;
use hwts_pipeline::{
    channel, CaptureWorker, DrainPolicy, LogWorker, PipelineStats, ShutdownToken, WaitStrategy,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: WaitStrategy = WaitStrategy::BoundedWait(Duration::from_micros(200));

#[test]
fn test_mixed_traffic_is_logged_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Test.csv");

    let source = ScriptedSource::new([
        Frame::Stamped(vec![ts(1, 0)]),
        Frame::Unstamped,
        Frame::Error,
        Frame::Stamped(vec![ts(1, 100)]),
        Frame::Error,
        Frame::Stamped(vec![ts(2, 0)]),
    ]);

    let (tx, rx) = channel::<TimestampRecord>(16).unwrap();
    let token = ShutdownToken::new();
    let stats = Arc::new(PipelineStats::new());

    let capture =
        CaptureWorker::new(source, tx, token.clone(), Arc::clone(&stats)).with_wait(WAIT);
    let log = LogWorker::create(&path, rx, token.clone(), Arc::clone(&stats))
        .unwrap()
        .with_wait(WAIT);

    let capture = thread::spawn(move || capture.run());
    let log = thread::spawn(move || log.run());

    while stats.snapshot().records_logged < 3 {
        thread::sleep(Duration::from_millis(1));
    }
    token.cancel();

    let (capture_summary, source) = capture.join().unwrap();
    let (log_summary, _) = log.join().unwrap();

    assert_eq!(source.remaining(), 0);
    assert_eq!(capture_summary.frames, 4);
    assert_eq!(capture_summary.without_timestamp, 1);
    assert_eq!(capture_summary.recv_errors, 2);
    assert_eq!(log_summary.records_written, 3);

    assert_eq!(
        read_log(&path),
        vec![(0, 1_000_000_000), (1, 1_000_000_100), (2, 2_000_000_000)]
    );
}

#[test]
fn test_buffered_records_survive_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drain.csv");

    let (tx, rx) = channel::<TimestampRecord>(64).unwrap();
    let token = ShutdownToken::new();
    let stats = Arc::new(PipelineStats::new());

    // Capture runs to completion before the log worker starts
    let frames = (0..40).map(|i| Frame::Stamped(vec![ts(10, i)]));
    let mut capture = CaptureWorker::new(
        ScriptedSource::new(frames),
        tx,
        token.clone(),
        Arc::clone(&stats),
    );
    for _ in 0..40 {
        capture.poll_once();
    }
    token.cancel();
    let (capture_summary, _) = capture.run();
    assert_eq!(capture_summary.pushed, 40);

    let log = LogWorker::create(&path, rx, token, Arc::clone(&stats))
        .unwrap()
        .with_wait(WAIT)
        .with_drain_policy(DrainPolicy::Drain);
    let (summary, _) = log.run();

    assert_eq!(summary.records_written, 40);
    assert_eq!(summary.abandoned, 0);

    let rows = read_log(&path);
    assert_eq!(rows.len(), 40);
    assert_eq!(rows[39], (39, 10_000_000_039));
}

#[test]
fn test_overflow_drops_newest_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overflow.csv");

    let (tx, rx) = channel::<TimestampRecord>(4).unwrap();
    let token = ShutdownToken::new();
    let stats = Arc::new(PipelineStats::new());

    let frames = (1..=6).map(|s| Frame::Stamped(vec![ts(s, 0)]));
    let mut capture = CaptureWorker::new(
        ScriptedSource::new(frames),
        tx,
        token.clone(),
        Arc::clone(&stats),
    );
    for _ in 0..6 {
        capture.poll_once();
    }
    token.cancel();
    let (capture_summary, _) = capture.run();
    assert_eq!(capture_summary.pushed, 3);
    assert_eq!(capture_summary.dropped, 3);

    let (summary, _) = LogWorker::create(&path, rx, token, stats)
        .unwrap()
        .run();
    assert_eq!(summary.records_written, 3);
    assert_eq!(
        read_log(&path),
        vec![(0, 1_000_000_000), (1, 2_000_000_000), (2, 3_000_000_000)]
    );
}

#[test]
fn test_output_is_truncated_on_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Test.csv");
    std::fs::write(&path, "SequenceNr;TimeInNs\n0;1\n1;2\n2;3\n").unwrap();

    let (tx, rx) = channel::<TimestampRecord>(4).unwrap();
    drop(tx);
    let token = ShutdownToken::new();
    token.cancel();

    let (summary, _) = LogWorker::create(&path, rx, token, Arc::new(PipelineStats::new()))
        .unwrap()
        .run();
    assert_eq!(summary.records_written, 0);
    assert!(read_log(&path).is_empty());
}
