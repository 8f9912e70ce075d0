//! Worker threads and their supervision.
//!
//! [`run_pipeline`] wires one frame source through the timestamp channel
//! into the output log, runs both workers on named threads, prints a
//! status line every `status_interval` and joins both workers once the
//! token leaves RUNNING.

use anyhow::{anyhow, Context, Result};
use hwts_common::{CaptureConfig, HwtsError};
use hwts_pipeline::{
    apply_affinity, channel, CaptureSummary, CaptureWorker, DrainPolicy, FrameSource, LogSummary,
    LogWorker, PipelineStats, ShutdownToken, StatsSnapshot, WaitStrategy,
};
use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Supervisor wake-up interval while waiting for shutdown.
const SUPERVISE_POLL: Duration = Duration::from_millis(100);

/// What the pipeline did, reported after both workers have stopped.
#[derive(Debug)]
pub struct PipelineReport<S> {
    /// Capture worker totals.
    pub capture: CaptureSummary,
    /// Log worker totals.
    pub log: LogSummary,
    /// Final counter values.
    pub stats: StatsSnapshot,
    /// The frame source, handed back by the capture worker.
    pub source: S,
}

/// Run the capture pipeline until `token` is cancelled.
///
/// # Errors
///
/// Fails if the channel or output file cannot be created, a worker thread
/// cannot be spawned, or a worker panics.
pub fn run_pipeline<S>(
    source: S,
    config: &CaptureConfig,
    token: &ShutdownToken,
) -> Result<PipelineReport<S>>
where
    S: FrameSource + 'static,
{
    let (producer, consumer) = channel(config.channel_capacity)
        .context("Failed to create timestamp channel")?;
    let stats = Arc::new(PipelineStats::new());
    let wait = WaitStrategy::from(config.wait.strategy);

    let log_worker =
        LogWorker::create(&config.output, consumer, token.clone(), Arc::clone(&stats))
            .context("Failed to create output log")?
            .with_wait(wait)
            .with_drain_policy(DrainPolicy::from_flag(config.logging.drain_on_shutdown));
    let capture_worker = CaptureWorker::new(source, producer, token.clone(), Arc::clone(&stats))
        .with_wait(wait)
        .with_buffer_size(config.capture.recv_buffer_size);

    let log_cpu = config.logging.log_cpu;
    let log_handle = thread::Builder::new()
        .name("hwts-log".into())
        .spawn(move || {
            apply_affinity("log", log_cpu);
            log_worker.run()
        })
        .context("Failed to spawn log worker")?;

    let capture_cpu = config.capture.capture_cpu;
    let capture_handle = match thread::Builder::new()
        .name("hwts-capture".into())
        .spawn(move || {
            apply_affinity("capture", capture_cpu);
            capture_worker.run()
        }) {
        Ok(handle) => handle,
        Err(e) => {
            // The unspawned closure dropped the producer; let the log worker finish
            token.cancel();
            if log_handle.join().is_err() {
                error!("Log worker panicked");
            }
            return Err(e).context("Failed to spawn capture worker");
        }
    };

    info!(
        capacity = config.channel_capacity,
        output = %config.output.display(),
        "Pipeline running, press Ctrl+C to stop"
    );
    supervise(token, &stats, config.status_interval, &capture_handle, &log_handle);

    info!("Stopping workers");
    // Joined independently so one failing worker does not leak the other
    let capture = join_worker("capture", capture_handle);
    let log = join_worker("log", log_handle);

    let (capture, source) = capture?;
    let (log, _file) = log?;

    Ok(PipelineReport {
        capture,
        log,
        stats: stats.snapshot(),
        source,
    })
}

/// Wait for shutdown, emitting periodic status lines. Worker liveness is
/// checked on every poll tick, independent of the status interval.
fn supervise<A, B>(
    token: &ShutdownToken,
    stats: &PipelineStats,
    status_interval: Duration,
    capture: &JoinHandle<A>,
    log: &JoinHandle<B>,
) {
    let mut last = stats.snapshot();
    let mut last_at = Instant::now();
    while !token.wait_timeout(SUPERVISE_POLL, SUPERVISE_POLL) {
        if capture.is_finished() || log.is_finished() {
            error!("Worker exited while pipeline was running, stopping");
            token.cancel();
            break;
        }

        let elapsed = last_at.elapsed();
        if elapsed < status_interval {
            continue;
        }

        let now = stats.snapshot();
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        #[allow(clippy::cast_precision_loss)]
        let rate = now.frames_received.saturating_sub(last.frames_received) as f64 / secs;
        info!(
            frames = now.frames_received,
            logged = now.records_logged,
            dropped = now.timestamps_dropped,
            in_flight = now.in_flight(),
            frames_per_sec = rate,
            "Capture status"
        );
        last = now;
        last_at = Instant::now();
    }
}

fn join_worker<T>(name: &str, handle: JoinHandle<T>) -> Result<T> {
    handle.join().map_err(|payload| {
        let message = panic_message(payload.as_ref());
        error!(worker = name, panic = %message, "Worker panicked");
        anyhow!(HwtsError::Thread(format!("{name} worker panicked: {message}")))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        warn!("Worker panic payload is not a string");
        "unknown panic".into()
    }
}
