//! Capture on a real interface.
//!
//! # Requirements
//!
//! - Root privileges
//! - `HWTS_TEST_IFACE` naming a NIC with hardware receive timestamping
//! - Some traffic on that interface during the test window
//!
//! # Acceptance Criteria
//!
//! - The socket opens with hardware timestamping enabled
//! - Every logged timestamp is non-zero and rows are numbered from 0

use super::common::check_hw_prerequisites;

#[cfg(target_os = "linux")]
#[test]
#[ignore = "requires root and a NIC with hardware timestamping"]
fn test_capture_on_real_interface() {
    use super::common::read_log;
    use hwts_common::TimestampRecord;
    use hwts_net::{CaptureSocket, SocketConfig};
    use hwts_pipeline::{
        channel, CaptureWorker, LogWorker, PipelineStats, ShutdownToken, WaitStrategy,
    };
    use std::sync::Arc;
    use std::time::Duration;

    let iface = match check_hw_prerequisites() {
        Ok(iface) => iface,
        Err(reason) => {
            eprintln!("SKIPPED: {reason}");
            return;
        }
    };

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hw.csv");

    let socket = CaptureSocket::open(&SocketConfig::new(iface)).unwrap();
    let (tx, rx) = channel::<TimestampRecord>(1024).unwrap();
    let token = ShutdownToken::new();
    let stats = Arc::new(PipelineStats::new());

    let capture = CaptureWorker::new(socket, tx, token.clone(), Arc::clone(&stats))
        .with_wait(WaitStrategy::Yield);
    let log = LogWorker::create(&path, rx, token.clone(), Arc::clone(&stats)).unwrap();

    let capture = std::thread::spawn(move || capture.run());
    let log = std::thread::spawn(move || log.run());

    std::thread::sleep(Duration::from_secs(2));
    token.cancel();

    let (_, mut socket) = capture.join().unwrap();
    let (summary, _) = log.join().unwrap();
    socket.restore_promiscuous().unwrap();

    let rows = read_log(&path);
    assert_eq!(rows.len() as u64, summary.records_written);
    for (i, (seq, nanos)) in rows.iter().enumerate() {
        assert_eq!(*seq, i as u64);
        assert!(*nanos > 0);
    }
    eprintln!(
        "captured {} frames, {} timestamps logged",
        stats.snapshot().frames_received,
        summary.records_written
    );
}

#[test]
fn test_prerequisite_check_reports_reason() {
    // Either the environment is ready or a reason is given
    if let Err(reason) = check_hw_prerequisites() {
        assert!(!reason.is_empty());
    }
}
