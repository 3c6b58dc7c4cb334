//! # Time Oracle
//!
//! Sale phases and vault locks are pure functions of "now". The contracts
//! never read an ambient clock; the host hands them a timestamp taken from
//! a [`Clock`]. Production uses [`SystemClock`]; tests drive a
//! [`ManualClock`] forward explicitly.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{TimeZone, Utc};
use thiserror::Error;

use crate::account::Timestamp;

/// Seconds in one hour.
pub const HOUR: i64 = 60 * 60;
/// Seconds in one day.
pub const DAY: i64 = 24 * HOUR;
/// Seconds in one week.
pub const WEEK: i64 = 7 * DAY;

/// Errors from manipulating a [`ManualClock`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    /// The requested time is earlier than the current reading.
    #[error("clock cannot move backwards: now {now}, requested {requested}")]
    Backwards {
        /// Current reading.
        now: Timestamp,
        /// Requested reading.
        requested: Timestamp,
    },
}

/// A source of the current Unix timestamp.
pub trait Clock: Send + Sync {
    /// Returns the current time in Unix seconds.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Moves the clock to `t`. Fails if `t` is in the past.
    pub fn set(&self, t: Timestamp) -> Result<(), ClockError> {
        self.now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                (t >= now).then_some(t)
            })
            .map(|_| ())
            .map_err(|now| ClockError::Backwards { now, requested: t })
    }

    /// Moves the clock forward by `secs` and returns the new reading.
    /// Negative values are ignored; the reading saturates at `i64::MAX`.
    pub fn advance(&self, secs: i64) -> Timestamp {
        let delta = secs.max(0);
        let step = |now: Timestamp| now.saturating_add(delta);
        match self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| Some(step(now)))
        {
            Ok(prev) | Err(prev) => step(prev),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Renders a timestamp as RFC 3339 for log output.
pub fn format_timestamp(ts: Timestamp) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.to_rfc3339(),
        None => format!("invalid({ts})"),
    }
}
