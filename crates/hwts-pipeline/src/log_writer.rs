//! Log worker: timestamp channel → delimited text log.
//!
//! Output format:
//!
//! ```text
//! SequenceNr;TimeInNs
//! 0;1700000000123456789
//! 1;1700000000123460001
//! ```

use crate::channel::Consumer;
use crate::shutdown::ShutdownToken;
use crate::stats::PipelineStats;
use crate::wait::WaitStrategy;
use hwts_common::{HwtsError, HwtsResult, TimestampRecord};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Header line of the output log.
pub const LOG_HEADER: &str = "SequenceNr;TimeInNs";

/// Rate limit for repeated write warnings.
const WARN_EVERY: u64 = 1000;

/// Flush at least this often while records keep arriving.
const FLUSH_EVERY: u64 = 1024;

/// Serialises timestamp records as `<sequence>;<nanoseconds>` lines.
#[derive(Debug)]
pub struct LogWriter<W: Write> {
    out: W,
    sequence: u64,
}

impl<W: Write> LogWriter<W> {
    /// Wrap `out` and write the header line.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the header cannot be written.
    pub fn new(mut out: W) -> io::Result<Self> {
        writeln!(out, "{LOG_HEADER}")?;
        Ok(Self { out, sequence: 0 })
    }

    /// Append one record and advance the sequence number.
    ///
    /// On error the sequence number is not advanced.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the underlying writer.
    pub fn append(&mut self, record: &TimestampRecord) -> io::Result<()> {
        writeln!(self.out, "{};{}", self.sequence, record.as_nanos())?;
        self.sequence += 1;
        Ok(())
    }

    /// Sequence number the next record will get; equals records written.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Flush buffered lines.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Return the underlying writer without flushing.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl LogWriter<BufWriter<File>> {
    /// Create (truncating) the log file at `path` and write the header.
    ///
    /// # Errors
    ///
    /// Returns [`HwtsError::Output`] if the file cannot be created or the
    /// header cannot be written.
    pub fn create(path: &Path) -> HwtsResult<Self> {
        let output_err = |source| HwtsError::Output {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(output_err)?;
        let writer = Self::new(BufWriter::new(file)).map_err(output_err)?;
        info!(path = %path.display(), "Output log created");
        Ok(writer)
    }
}

/// What the log worker does with buffered records once shutdown starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Keep logging until the producer is gone and the channel is empty.
    #[default]
    Drain,
    /// Stop at the first empty poll after shutdown; buffered records that
    /// arrive later are lost.
    Abandon,
}

impl DrainPolicy {
    /// Map the `drain_on_shutdown` config flag.
    #[must_use]
    pub fn from_flag(drain_on_shutdown: bool) -> Self {
        if drain_on_shutdown {
            Self::Drain
        } else {
            Self::Abandon
        }
    }
}

/// Totals reported by the log worker when it exits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogSummary {
    /// Records confirmed on the sink by a successful flush.
    pub records_written: u64,
    /// Records lost to a failed write or flush.
    pub write_errors: u64,
    /// Records left in the channel at exit.
    pub abandoned: usize,
}

/// Drains the channel into a [`LogWriter`].
///
/// A record only counts as written once the flush that follows it
/// succeeds. If a flush fails, every record appended since the last good
/// flush is counted as a write error.
pub struct LogWorker<W: Write> {
    consumer: Consumer<TimestampRecord>,
    writer: LogWriter<W>,
    token: ShutdownToken,
    wait: WaitStrategy,
    drain: DrainPolicy,
    stats: Arc<PipelineStats>,
    written: u64,
    unflushed: u64,
    write_errors: u64,
}

impl<W: Write> LogWorker<W> {
    /// Create a worker with busy polling and full drain on shutdown.
    pub fn new(
        consumer: Consumer<TimestampRecord>,
        writer: LogWriter<W>,
        token: ShutdownToken,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            consumer,
            writer,
            token,
            wait: WaitStrategy::BusyPoll,
            drain: DrainPolicy::Drain,
            stats,
            written: 0,
            unflushed: 0,
            write_errors: 0,
        }
    }

    /// Set the idle strategy.
    #[must_use]
    pub fn with_wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    /// Set the shutdown drain policy.
    #[must_use]
    pub fn with_drain_policy(mut self, drain: DrainPolicy) -> Self {
        self.drain = drain;
        self
    }

    /// Pop and log at most one record. Returns true if a record was popped.
    pub fn log_once(&mut self) -> bool {
        let Some(record) = self.consumer.try_pop() else {
            return false;
        };

        match self.writer.append(&record) {
            Ok(()) => self.unflushed += 1,
            Err(e) => self.count_errors(1, &e, "Log write failed"),
        }
        true
    }

    /// Flush and settle the records appended since the last flush.
    /// Returns false if the flush failed.
    pub fn flush(&mut self) -> bool {
        let pending = std::mem::take(&mut self.unflushed);
        match self.writer.flush() {
            Ok(()) => {
                self.written += pending;
                self.stats.record_logged(pending);
                true
            }
            Err(e) if pending == 0 => {
                warn!(error = %e, "Log flush failed");
                false
            }
            Err(e) => {
                self.count_errors(pending, &e, "Log flush failed");
                false
            }
        }
    }

    fn count_errors(&mut self, lost: u64, err: &io::Error, what: &str) {
        self.write_errors += lost;
        let total = self.stats.record_write_errors(lost);
        // Warn on the first error and roughly every WARN_EVERY after that
        if total == lost || total / WARN_EVERY != (total - lost) / WARN_EVERY {
            error!(error = %err, lost, total_errors = total, "{what}");
        }
    }

    fn should_exit(&self) -> bool {
        if self.token.is_running() {
            return false;
        }
        match self.drain {
            DrainPolicy::Abandon => true,
            // Closed is checked before emptiness: once the producer is gone
            // no further pushes can land behind the emptiness check.
            DrainPolicy::Drain => self.consumer.is_producer_closed() && self.consumer.is_empty(),
        }
    }

    /// Run until shutdown, then drain according to the policy.
    pub fn run(mut self) -> (LogSummary, W) {
        info!(drain = ?self.drain, wait = ?self.wait, "Log worker starting");

        loop {
            if self.log_once() {
                if self.unflushed >= FLUSH_EVERY {
                    self.flush();
                }
                continue;
            }

            // Idle: push buffered lines out once per idle period
            if self.unflushed > 0 {
                self.flush();
            }

            if self.should_exit() {
                break;
            }
            self.wait.idle();
        }

        let abandoned = self.consumer.len();
        if abandoned > 0 {
            warn!(abandoned, "Records left unlogged at shutdown");
        }
        self.flush();

        let summary = LogSummary {
            records_written: self.written,
            write_errors: self.write_errors,
            abandoned,
        };
        debug!(?summary, "Log worker stopped");

        (summary, self.writer.into_inner())
    }
}

impl LogWorker<BufWriter<File>> {
    /// Open `path` (truncating) and build a worker writing to it.
    ///
    /// # Errors
    ///
    /// Returns [`HwtsError::Output`] if the file cannot be created.
    pub fn create(
        path: impl Into<PathBuf>,
        consumer: Consumer<TimestampRecord>,
        token: ShutdownToken,
        stats: Arc<PipelineStats>,
    ) -> HwtsResult<Self> {
        let path = path.into();
        let writer = LogWriter::create(&path)?;
        Ok(Self::new(consumer, writer, token, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use std::time::Duration;

    fn ts(seconds: u64, nanoseconds: u32) -> TimestampRecord {
        TimestampRecord::new(seconds, nanoseconds).unwrap()
    }

    fn lines(bytes: &[u8]) -> Vec<String> {
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_header_and_sequence() {
        let mut writer = LogWriter::new(Vec::new()).unwrap();
        writer.append(&ts(1, 0)).unwrap();
        writer.append(&ts(1, 500_000_000)).unwrap();
        writer.append(&ts(0, 0)).unwrap();
        assert_eq!(writer.sequence(), 3);

        assert_eq!(
            lines(&writer.into_inner()),
            vec![
                "SequenceNr;TimeInNs",
                "0;1000000000",
                "1;1500000000",
                "2;0"
            ]
        );
    }

    /// Accepts the header, then fails every write.
    struct FailAfterHeader {
        header_written: bool,
    }

    impl Write for FailAfterHeader {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.header_written {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            if buf.ends_with(b"\n") {
                self.header_written = true;
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_keeps_sequence() {
        let mut writer = LogWriter::new(FailAfterHeader {
            header_written: false,
        })
        .unwrap();
        assert!(writer.append(&ts(1, 0)).is_err());
        assert_eq!(writer.sequence(), 0);
    }

    #[test]
    fn test_worker_drains_after_shutdown() {
        let (mut tx, rx) = channel(8).unwrap();
        let token = ShutdownToken::new();
        let stats = Arc::new(PipelineStats::new());

        for s in 1..=5 {
            tx.try_push(ts(s, 0)).unwrap();
        }
        token.cancel();
        drop(tx);

        let writer = LogWriter::new(Vec::new()).unwrap();
        let (summary, out) = LogWorker::new(rx, writer, token, Arc::clone(&stats)).run();

        assert_eq!(summary.records_written, 5);
        assert_eq!(summary.abandoned, 0);
        assert_eq!(stats.snapshot().records_logged, 5);
        let out = lines(&out);
        assert_eq!(out.len(), 6);
        assert_eq!(out[5], "4;5000000000");
    }

    #[test]
    fn test_worker_waits_for_producer_before_exit() {
        let (mut tx, rx) = channel(8).unwrap();
        let token = ShutdownToken::new();
        let stats = Arc::new(PipelineStats::new());
        token.cancel();

        let worker = LogWorker::new(rx, LogWriter::new(Vec::new()).unwrap(), token, stats)
            .with_wait(WaitStrategy::BoundedWait(Duration::from_millis(1)));
        let handle = std::thread::spawn(move || worker.run());

        // Still-open producer keeps the draining worker alive
        std::thread::sleep(Duration::from_millis(20));
        tx.try_push(ts(9, 9)).unwrap();
        drop(tx);

        let (summary, out) = handle.join().unwrap();
        assert_eq!(summary.records_written, 1);
        assert_eq!(lines(&out)[1], "0;9000000009");
    }

    #[test]
    fn test_abandon_policy_stops_at_first_empty_poll() {
        let (_tx, rx) = channel::<TimestampRecord>(8).unwrap();
        let token = ShutdownToken::new();
        token.cancel();

        let worker = LogWorker::new(
            rx,
            LogWriter::new(Vec::new()).unwrap(),
            token,
            Arc::new(PipelineStats::new()),
        )
        .with_drain_policy(DrainPolicy::Abandon);

        let (summary, out) = worker.run();
        assert_eq!(summary.records_written, 0);
        assert_eq!(lines(&out), vec![LOG_HEADER]);
    }

    #[test]
    fn test_write_errors_are_counted_not_fatal() {
        let (mut tx, rx) = channel(4).unwrap();
        tx.try_push(ts(1, 0)).unwrap();
        tx.try_push(ts(2, 0)).unwrap();
        drop(tx);
        let token = ShutdownToken::new();
        token.cancel();
        let stats = Arc::new(PipelineStats::new());

        let writer = LogWriter::new(FailAfterHeader {
            header_written: false,
        })
        .unwrap();
        let (summary, _) = LogWorker::new(rx, writer, token, Arc::clone(&stats)).run();

        assert_eq!(summary.records_written, 0);
        assert_eq!(summary.write_errors, 2);
        assert_eq!(stats.snapshot().write_errors, 2);
    }

    /// Sink whose writes and flushes always fail.
    struct Unplugged;

    impl Write for Unplugged {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }
    }

    #[test]
    fn test_failed_flush_counts_buffered_records_as_errors() {
        let (mut tx, rx) = channel(8).unwrap();
        for s in 1..=3 {
            tx.try_push(ts(s, 0)).unwrap();
        }
        drop(tx);
        let token = ShutdownToken::new();
        token.cancel();
        let stats = Arc::new(PipelineStats::new());

        // Appends land in the buffer; the failure only shows at flush
        let writer = LogWriter::new(BufWriter::new(Unplugged)).unwrap();
        let (summary, _) = LogWorker::new(rx, writer, token, Arc::clone(&stats)).run();

        assert_eq!(summary.records_written, 0);
        assert_eq!(summary.write_errors, 3);
        let snap = stats.snapshot();
        assert_eq!(snap.records_logged, 0);
        assert_eq!(snap.write_errors, 3);
        assert_eq!(snap.in_flight(), 0);
    }

    #[test]
    fn test_records_count_once_flushed() {
        let (mut tx, rx) = channel(8).unwrap();
        let stats = Arc::new(PipelineStats::new());
        let mut worker = LogWorker::new(
            rx,
            LogWriter::new(BufWriter::new(Vec::new())).unwrap(),
            ShutdownToken::new(),
            Arc::clone(&stats),
        );

        tx.try_push(ts(1, 0)).unwrap();
        tx.try_push(ts(2, 0)).unwrap();
        assert!(worker.log_once());
        assert!(worker.log_once());
        assert!(!worker.log_once());
        assert_eq!(stats.snapshot().records_logged, 0);

        assert!(worker.flush());
        assert_eq!(stats.snapshot().records_logged, 2);
    }

    #[test]
    fn test_create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale\nstale\nstale\n").unwrap();

        let mut writer = LogWriter::create(&path).unwrap();
        writer.append(&ts(3, 3)).unwrap();
        drop(writer.into_inner());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "SequenceNr;TimeInNs\n0;3000000003\n");
    }

    #[test]
    fn test_create_reports_path_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        let err = LogWriter::create(&path).unwrap_err();
        assert!(matches!(err, HwtsError::Output { path: p, .. } if p == path));
    }
}
