//! Hardware timestamp records.
//!
//! A [`TimestampRecord`] is the unit of data flowing through the capture
//! pipeline: one per received frame that carried a raw hardware timestamp.

use crate::error::{HwtsError, HwtsResult};
use std::fmt;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A single hardware receive timestamp as reported by the adapter.
///
/// Invariant: `nanoseconds < 1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimestampRecord {
    seconds: u64,
    nanoseconds: u32,
}

impl TimestampRecord {
    /// The zero timestamp. Drivers report it for slots they did not fill.
    pub const ZERO: Self = Self {
        seconds: 0,
        nanoseconds: 0,
    };

    /// Create a record from a seconds/nanoseconds pair.
    ///
    /// # Errors
    ///
    /// Returns [`HwtsError::InvalidTimestamp`] if `nanoseconds` is not
    /// below one second.
    pub fn new(seconds: u64, nanoseconds: u32) -> HwtsResult<Self> {
        if u64::from(nanoseconds) >= NANOS_PER_SEC {
            return Err(HwtsError::InvalidTimestamp {
                seconds: i64::try_from(seconds).unwrap_or(i64::MAX),
                nanoseconds: i64::from(nanoseconds),
            });
        }
        Ok(Self {
            seconds,
            nanoseconds,
        })
    }

    /// Create a record from the signed fields of a kernel `timespec`.
    ///
    /// # Errors
    ///
    /// Returns [`HwtsError::InvalidTimestamp`] for negative seconds or
    /// nanoseconds outside `0..1_000_000_000`.
    pub fn from_timespec(tv_sec: i64, tv_nsec: i64) -> HwtsResult<Self> {
        let invalid = || HwtsError::InvalidTimestamp {
            seconds: tv_sec,
            nanoseconds: tv_nsec,
        };
        let seconds = u64::try_from(tv_sec).map_err(|_| invalid())?;
        let nanoseconds = u32::try_from(tv_nsec).map_err(|_| invalid())?;
        Self::new(seconds, nanoseconds).map_err(|_| invalid())
    }

    /// Whole seconds.
    #[inline]
    #[must_use]
    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    /// Sub-second nanoseconds.
    #[inline]
    #[must_use]
    pub fn nanoseconds(&self) -> u32 {
        self.nanoseconds
    }

    /// Returns true for the all-zero timestamp.
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Total nanoseconds: `seconds * 1_000_000_000 + nanoseconds`.
    ///
    /// Saturates at `u64::MAX`, which no adapter clock reaches before 2554.
    #[inline]
    #[must_use]
    pub fn as_nanos(&self) -> u64 {
        self.seconds
            .saturating_mul(NANOS_PER_SEC)
            .saturating_add(u64::from(self.nanoseconds))
    }
}

impl fmt::Display for TimestampRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}
