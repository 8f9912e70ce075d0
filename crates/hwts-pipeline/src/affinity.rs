//! Worker CPU pinning.
//!
//! Busy-polling workers behave best on a dedicated core. Pinning is
//! applied from inside the worker thread and is best-effort: a worker that
//! cannot be pinned keeps running wherever the scheduler puts it.

#![allow(unused_imports)] // Platform-specific code may not use all imports

use tracing::{debug, info, warn};

/// Pin the calling thread to `cpu`.
///
/// Returns true if the affinity was applied.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(worker: &str, cpu: usize) -> bool {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpu_set = CpuSet::new();
    if let Err(e) = cpu_set.set(cpu) {
        warn!(worker, cpu, error = %e, "Invalid CPU index, worker not pinned");
        return false;
    }

    // Pid 0 targets the calling thread
    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            info!(worker, cpu, "Worker pinned to CPU");
            true
        }
        Err(nix::errno::Errno::EINVAL) => {
            warn!(worker, cpu, "CPU not available, worker not pinned");
            false
        }
        Err(e) => {
            warn!(worker, cpu, error = %e, "sched_setaffinity failed, worker not pinned");
            false
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(worker: &str, cpu: usize) -> bool {
    warn!(worker, cpu, "CPU affinity not available on this platform");
    false
}

/// Pin the calling thread if a CPU is configured.
pub fn apply_affinity(worker: &str, cpu: Option<usize>) -> bool {
    match cpu {
        Some(cpu) => pin_current_thread(worker, cpu),
        None => {
            debug!(worker, "No CPU affinity configured");
            false
        }
    }
}
