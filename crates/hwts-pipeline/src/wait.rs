//! Idle behaviour for the polling workers.
//!
//! Both workers poll without blocking. When a poll finds nothing to do the
//! worker calls [`WaitStrategy::idle`] before retrying. Busy polling keeps
//! latency minimal at the cost of a full core per worker; the bounded
//! variants exist for tests and shared machines.

use hwts_common::WaitConfig;
use std::time::Duration;

/// What a worker does between empty polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitStrategy {
    /// Spin with a CPU pause hint.
    #[default]
    BusyPoll,
    /// Give up the time slice.
    Yield,
    /// Sleep for at most the given duration.
    BoundedWait(Duration),
}

impl WaitStrategy {
    /// Wait once according to the strategy.
    #[inline]
    pub fn idle(&self) {
        match self {
            Self::BusyPoll => std::hint::spin_loop(),
            Self::Yield => std::thread::yield_now(),
            Self::BoundedWait(d) => std::thread::sleep(*d),
        }
    }

    /// Returns true if the strategy never gives up the CPU.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::BusyPoll)
    }
}

impl From<WaitConfig> for WaitStrategy {
    fn from(config: WaitConfig) -> Self {
        match config {
            WaitConfig::BusyPoll => Self::BusyPoll,
            WaitConfig::Yield => Self::Yield,
            WaitConfig::Sleep(d) => Self::BoundedWait(d),
        }
    }
}
