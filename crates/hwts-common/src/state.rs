//! Pipeline lifecycle state.
//!
//! The capture pipeline is one-shot: it starts in RUNNING and moves to
//! STOPPING exactly once when an interrupt is received. There is no way
//! back to RUNNING within a process lifetime.

use crate::error::{HwtsError, HwtsResult};
use std::fmt;

/// Lifecycle states of the capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PipelineState {
    /// Workers are polling.
    #[default]
    Running = 0,
    /// Shutdown requested; workers exit at their next poll.
    Stopping = 1,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Stopping => write!(f, "STOPPING"),
        }
    }
}

impl PipelineState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: PipelineState) -> bool {
        matches!((self, target), (Self::Running, Self::Stopping))
    }

    /// Attempt to transition to `target`, returning error if invalid.
    ///
    /// # Errors
    ///
    /// Returns [`HwtsError::InvalidStateTransition`] for anything other
    /// than RUNNING → STOPPING.
    pub fn transition_to(&mut self, target: PipelineState) -> HwtsResult<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(HwtsError::InvalidStateTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Decode from the raw representation used by atomic storage.
    /// Unknown values decode as STOPPING.
    #[must_use]
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            _ => Self::Stopping,
        }
    }

    /// Returns true while the workers should keep polling.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert_eq!(PipelineState::default(), PipelineState::Running);
        assert!(PipelineState::default().is_running());
    }

    #[test]
    fn test_running_to_stopping() {
        let mut state = PipelineState::Running;
        state.transition_to(PipelineState::Stopping).unwrap();
        assert_eq!(state, PipelineState::Stopping);
    }

    #[test]
    fn test_no_restart() {
        let mut state = PipelineState::Stopping;
        let err = state.transition_to(PipelineState::Running).unwrap_err();
        assert!(matches!(err, HwtsError::InvalidStateTransition { .. }));
        assert!(state.transition_to(PipelineState::Stopping).is_err());
    }

    #[test]
    fn test_raw_roundtrip() {
        assert_eq!(PipelineState::from_u8(PipelineState::Running as u8), PipelineState::Running);
        assert_eq!(PipelineState::from_u8(PipelineState::Stopping as u8), PipelineState::Stopping);
        assert_eq!(PipelineState::from_u8(7), PipelineState::Stopping);
    }

    #[test]
    fn test_display() {
        assert_eq!(PipelineState::Running.to_string(), "RUNNING");
        assert_eq!(PipelineState::Stopping.to_string(), "STOPPING");
    }
}
