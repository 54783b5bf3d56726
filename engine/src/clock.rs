//! Time sources for operation ordering and TTL expiry.
//!
//! Operation timestamps must never go backwards, even if the wall clock does.
//! [`SystemClock`] clamps to the last value it handed out; [`ManualClock`] is
//! driven explicitly and is what tests use.

use crate::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically non-decreasing millisecond clock.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> Timestamp;
}

/// Wall clock, clamped so successive reads never decrease.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> Timestamp {
        let wall = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let prev = self.last.fetch_max(wall, Ordering::AcqRel);
        prev.max(wall)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start` milliseconds.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::AcqRel);
    }

    /// Jump to `to`. Ignored if `to` is earlier than the current reading.
    pub fn set(&self, to: Timestamp) {
        self.now.fetch_max(to, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Timestamp {
        self.now.load(Ordering::Acquire)
    }
}

/// Render a millisecond timestamp as an RFC 3339 string (UTC, millisecond precision).
pub fn to_rfc3339(millis: Timestamp) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
