//! Wall-clock instants and the injectable clock.
//!
//! All lifecycle scheduling works on absolute wall-clock instants. The
//! controller never reads the system clock directly; it goes through the
//! [`Clock`] trait so that tests can drive time deterministically with
//! tokio's paused runtime.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Tolerance for timer inaccuracy and scheduling delay.
///
/// A timer firing earlier than its target by more than this window is
/// re-armed instead of acted upon; a target closer than this window is
/// treated as due now.
pub const ANNOUNCEMENT_WINDOW: Duration = Duration::from_millis(500);

/// Upper bound for any single scheduled delay.
///
/// Long-horizon targets re-arm when the truncated timer fires early.
pub const MAX_SCHEDULE: Duration = Duration::from_secs(24 * 60 * 60);

/// An absolute wall-clock instant in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Milliseconds since the Unix epoch.
    pub ms: u64,
}

impl Timestamp {
    /// Create a timestamp from a millisecond value.
    pub const fn new(ms: u64) -> Self {
        Self { ms }
    }

    /// The epoch start.
    pub const fn zero() -> Self {
        Self { ms: 0 }
    }

    /// Advance this timestamp by a duration.
    pub fn plus(self, duration: Duration) -> Self {
        Self {
            ms: self.ms.saturating_add(duration_ms(duration)),
        }
    }

    /// Move this timestamp back by a duration, saturating at the epoch.
    pub fn minus(self, duration: Duration) -> Self {
        Self {
            ms: self.ms.saturating_sub(duration_ms(duration)),
        }
    }

    /// Check if this instant is strictly before `other`.
    pub const fn is_before(self, other: Timestamp) -> bool {
        self.ms < other.ms
    }

    /// Check if this instant is at or after `other`.
    pub const fn is_at_or_after(self, other: Timestamp) -> bool {
        self.ms >= other.ms
    }

    /// Duration from this instant until `target`.
    ///
    /// Returns zero if `target` has already passed.
    pub fn duration_until(self, target: Timestamp) -> Duration {
        Duration::from_millis(target.ms.saturating_sub(self.ms))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t+{}ms", self.ms)
    }
}

/// Convert a duration to whole milliseconds, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Truncate a scheduled delay to at most one day.
pub fn truncate_to_one_day(delay: Duration) -> Duration {
    delay.min(MAX_SCHEDULE)
}

/// Source of the current wall-clock instant.
///
/// Exactly one clock is injected per controller; production uses
/// [`SystemClock`], tests use [`SimClock`] under a paused tokio runtime.
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> Timestamp;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::new(duration_ms(since_epoch))
    }
}

/// Simulated clock anchored to tokio's time source.
///
/// The reported instant is `base + elapsed(tokio::time::Instant)`, so with a
/// paused runtime `tokio::time::advance` moves this clock and every pending
/// timer in lock-step.
#[derive(Debug, Clone)]
pub struct SimClock {
    base: Timestamp,
    started: tokio::time::Instant,
}

impl SimClock {
    /// Create a simulated clock reporting `base` as the current instant.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(base: Timestamp) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        self.base.plus(self.started.elapsed())
    }
}
