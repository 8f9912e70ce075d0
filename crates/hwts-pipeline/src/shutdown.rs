//! Cooperative shutdown token.
//!
//! One token is created at startup and cloned into every worker. The
//! signal path calls [`ShutdownToken::cancel`] once; workers check
//! [`ShutdownToken::is_running`] on every poll iteration.

use hwts_common::{HwtsResult, PipelineState};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Shared RUNNING → STOPPING flag with Release/Acquire semantics.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    state: Arc<AtomicU8>,
}

impl ShutdownToken {
    /// Create a token in the RUNNING state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PipelineState::Running as u8)),
        }
    }

    /// Current pipeline state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns true until shutdown has been requested.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Request shutdown. Safe to call from any thread, any number of
    /// times; returns true only for the call that performed the
    /// RUNNING → STOPPING transition.
    pub fn cancel(&self) -> bool {
        self.transition_to(PipelineState::Stopping).is_ok()
    }

    /// Atomically move the shared state to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`hwts_common::HwtsError::InvalidStateTransition`] if the
    /// current state does not allow moving to `target`.
    pub fn transition_to(&self, target: PipelineState) -> HwtsResult<()> {
        let mut current = self.state();
        loop {
            let mut next = current;
            next.transition_to(target)?;
            match self.state.compare_exchange_weak(
                current as u8,
                next as u8,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    info!("Pipeline state {current} -> {next}");
                    return Ok(());
                }
                Err(raw) => current = PipelineState::from_u8(raw),
            }
        }
    }

    /// Block until shutdown is requested or `timeout` expires, polling at
    /// `poll_interval`.
    ///
    /// Returns `true` if shutdown was requested, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration, poll_interval: Duration) -> bool {
        let start = Instant::now();

        while start.elapsed() < timeout {
            if !self.is_running() {
                return true;
            }
            std::thread::sleep(poll_interval.min(timeout.saturating_sub(start.elapsed())));
        }

        !self.is_running()
    }
}
