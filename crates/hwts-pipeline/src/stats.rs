//! Pipeline counters shared between the workers and the supervisor.
//!
//! Workers bump counters with relaxed atomics on the hot path; the
//! supervising thread reads a [`StatsSnapshot`] for periodic status lines
//! and the final shutdown report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared pipeline counters.
#[derive(Debug)]
pub struct PipelineStats {
    /// Frames returned by the capture source.
    frames_received: AtomicU64,
    /// Frames that carried no raw hardware timestamp.
    frames_without_timestamp: AtomicU64,
    /// Timestamps accepted by the channel.
    timestamps_pushed: AtomicU64,
    /// Timestamps dropped because the channel was full.
    timestamps_dropped: AtomicU64,
    /// Receive calls that failed with something other than "would block".
    recv_errors: AtomicU64,
    /// Records confirmed on the output log by a successful flush.
    records_logged: AtomicU64,
    /// Failed writes to the output log.
    write_errors: AtomicU64,
    /// Pipeline start time.
    start_time: Instant,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_without_timestamp: AtomicU64::new(0),
            timestamps_pushed: AtomicU64::new(0),
            timestamps_dropped: AtomicU64::new(0),
            recv_errors: AtomicU64::new(0),
            records_logged: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub(crate) fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_missing_timestamp(&self) {
        self.frames_without_timestamp.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_push(&self) {
        self.timestamps_pushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the drop count including this one.
    #[inline]
    pub(crate) fn record_drop(&self) -> u64 {
        self.timestamps_dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the error count including this one.
    #[inline]
    pub(crate) fn record_recv_error(&self) -> u64 {
        self.recv_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub(crate) fn record_logged(&self, count: u64) {
        self.records_logged.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the error count including these.
    #[inline]
    pub(crate) fn record_write_errors(&self, count: u64) -> u64 {
        self.write_errors.fetch_add(count, Ordering::Relaxed) + count
    }

    /// Timestamps dropped because the channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.timestamps_dropped.load(Ordering::Relaxed)
    }

    /// Take a consistent-enough copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_without_timestamp: self.frames_without_timestamp.load(Ordering::Relaxed),
            timestamps_pushed: self.timestamps_pushed.load(Ordering::Relaxed),
            timestamps_dropped: self.timestamps_dropped.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            records_logged: self.records_logged.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            uptime: self.start_time.elapsed(),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Frames returned by the capture source.
    pub frames_received: u64,
    /// Frames without a raw hardware timestamp.
    pub frames_without_timestamp: u64,
    /// Timestamps accepted by the channel.
    pub timestamps_pushed: u64,
    /// Timestamps dropped on a full channel.
    pub timestamps_dropped: u64,
    /// Non-transient receive errors.
    pub recv_errors: u64,
    /// Records confirmed on the log.
    pub records_logged: u64,
    /// Failed log writes.
    pub write_errors: u64,
    /// Time since the counters were created.
    pub uptime: Duration,
}

impl StatsSnapshot {
    /// Timestamps pushed but not yet logged.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.timestamps_pushed
            .saturating_sub(self.records_logged + self.write_errors)
    }
}
