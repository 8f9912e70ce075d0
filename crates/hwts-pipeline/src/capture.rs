//! Capture worker: frame source → timestamp channel.
//!
//! The worker polls a [`FrameSource`] without blocking, looks through the
//! ancillary entries delivered with each frame for socket timestamping
//! records, and pushes the raw hardware timestamp onto the channel.
//!
//! # Hot-path policy
//!
//! - "Would block" is not an error: the worker idles and polls again
//! - Other receive errors are logged and counted; the worker never exits
//!   because of them
//! - A full channel drops the timestamp and counts the drop; the capture
//!   path never waits for the log worker

use crate::channel::{Full, Producer};
use crate::shutdown::ShutdownToken;
use crate::stats::PipelineStats;
use crate::wait::WaitStrategy;
use hwts_common::TimestampRecord;
use std::io;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Default receive buffer size in bytes.
pub const DEFAULT_RECV_BUFFER: usize = 4096;

/// Rate limit for repeated warnings: log the first, then every Nth.
const WARN_EVERY: u64 = 1000;

/// The three timestamps of one socket timestamping record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimestampSet {
    /// Software timestamp taken by the kernel.
    pub software: TimestampRecord,
    /// Legacy hardware timestamp transformed to system time.
    pub hw_transformed: TimestampRecord,
    /// Raw hardware timestamp from the adapter clock.
    pub hw_raw: TimestampRecord,
}

impl TimestampSet {
    /// The raw hardware timestamp, if the driver filled it in.
    #[must_use]
    pub fn raw_hardware(&self) -> Option<TimestampRecord> {
        (!self.hw_raw.is_zero()).then_some(self.hw_raw)
    }
}

/// One typed ancillary (control message) entry received with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancillary {
    /// A socket-level timestamping record.
    Timestamping(TimestampSet),
    /// Any other control message, identified by level and type.
    Other {
        /// `cmsg_level`.
        level: i32,
        /// `cmsg_type`.
        kind: i32,
    },
}

/// Non-blocking source of link-layer frames with ancillary data.
pub trait FrameSource: Send {
    /// Receive at most one frame into `buf`.
    ///
    /// Implementations must clear `ancillary` and append one entry per
    /// control message received with the frame. Returns the frame length.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::WouldBlock`] when no frame is available
    /// and any other error for a failed receive.
    fn recv(&mut self, buf: &mut [u8], ancillary: &mut Vec<Ancillary>) -> io::Result<usize>;
}

/// Result of a single poll of the frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No frame was available.
    Idle,
    /// A frame was received; counts refer to timestamping entries.
    Frame {
        /// Timestamps accepted by the channel.
        pushed: usize,
        /// Timestamps dropped on a full channel.
        dropped: usize,
    },
    /// The receive failed.
    Error,
}

/// Totals reported by the capture worker when it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureSummary {
    /// Frames received.
    pub frames: u64,
    /// Timestamps pushed onto the channel.
    pub pushed: u64,
    /// Timestamps dropped on a full channel.
    pub dropped: u64,
    /// Frames without a raw hardware timestamp.
    pub without_timestamp: u64,
    /// Failed receives.
    pub recv_errors: u64,
}

/// Polls a [`FrameSource`] and feeds raw hardware timestamps into the
/// channel.
pub struct CaptureWorker<S> {
    source: S,
    producer: Producer<TimestampRecord>,
    token: ShutdownToken,
    wait: WaitStrategy,
    stats: Arc<PipelineStats>,
    buf: Vec<u8>,
    ancillary: Vec<Ancillary>,
}

impl<S: FrameSource> CaptureWorker<S> {
    /// Create a worker with busy polling and the default buffer size.
    pub fn new(
        source: S,
        producer: Producer<TimestampRecord>,
        token: ShutdownToken,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            source,
            producer,
            token,
            wait: WaitStrategy::BusyPoll,
            stats,
            buf: vec![0; DEFAULT_RECV_BUFFER],
            ancillary: Vec::with_capacity(4),
        }
    }

    /// Set the idle strategy.
    #[must_use]
    pub fn with_wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    /// Set the frame receive buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buf = vec![0; size.max(1)];
        self
    }

    /// Poll the source once and forward any timestamps.
    pub fn poll_once(&mut self) -> PollOutcome {
        let len = match self.source.recv(&mut self.buf, &mut self.ancillary) {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return PollOutcome::Idle,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return PollOutcome::Idle,
            Err(e) => {
                let count = self.stats.record_recv_error();
                if count == 1 || count % WARN_EVERY == 0 {
                    warn!(error = %e, total_errors = count, "Frame receive failed");
                }
                return PollOutcome::Error;
            }
        };

        self.stats.record_frame();

        let mut found = false;
        let mut pushed = 0;
        let mut dropped = 0;

        for entry in &self.ancillary {
            let Ancillary::Timestamping(set) = entry else {
                continue;
            };
            let Some(ts) = set.raw_hardware() else {
                continue;
            };
            found = true;

            match self.producer.try_push(ts) {
                Ok(()) => {
                    self.stats.record_push();
                    pushed += 1;
                }
                Err(Full(ts)) => {
                    let count = self.stats.record_drop();
                    dropped += 1;
                    if count == 1 || count % WARN_EVERY == 0 {
                        warn!(
                            timestamp = %ts,
                            total_dropped = count,
                            "Timestamp channel full, dropping timestamp"
                        );
                    }
                }
            }
        }

        if found {
            trace!(len, pushed, dropped, "Frame timestamped");
        } else {
            self.stats.record_missing_timestamp();
            trace!(len, "Frame without hardware timestamp");
        }

        PollOutcome::Frame { pushed, dropped }
    }

    /// Run until the shutdown token leaves RUNNING.
    ///
    /// The channel's producer side is closed before returning; the source
    /// is handed back so the caller can undo interface changes.
    pub fn run(mut self) -> (CaptureSummary, S) {
        info!(
            buffer = self.buf.len(),
            capacity = self.producer.capacity(),
            wait = ?self.wait,
            "Capture worker starting"
        );

        while self.token.is_running() {
            if self.poll_once() == PollOutcome::Idle {
                self.wait.idle();
            }
        }

        let snap = self.stats.snapshot();
        let summary = CaptureSummary {
            frames: snap.frames_received,
            pushed: snap.timestamps_pushed,
            dropped: snap.timestamps_dropped,
            without_timestamp: snap.frames_without_timestamp,
            recv_errors: snap.recv_errors,
        };
        debug!(?summary, "Capture worker stopped");

        let Self {
            source, producer, ..
        } = self;
        drop(producer);
        (summary, source)
    }
}
