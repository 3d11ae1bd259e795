//! Time source for the relay.
//!
//! All time-dependent logic reads the clock through [`Clock`] so recency
//! windows and stamps can be tested against a [`ManualClock`].

use chrono::{Local, Utc};
use concierge_protocol::{Stamp, Timestamp};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// A source of wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds since the Unix epoch.
    fn now(&self) -> Timestamp;

    /// Offset of UTC from local time in milliseconds (UTC minus local),
    /// the convention of the browser `Date#getTimezoneOffset`.
    fn utc_offset_ms(&self) -> i64;

    /// Server stamp for the current instant.
    fn stamp(&self) -> Stamp {
        Stamp::new(self.now(), self.utc_offset_ms())
    }
}

/// The system clock, with the offset of the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // Clamp pre-epoch system times to zero.
        Timestamp::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }

    fn utc_offset_ms(&self) -> i64 {
        -i64::from(Local::now().offset().local_minus_utc()) * 1000
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
    utc_offset_ms: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `now` with the given UTC offset.
    #[must_use]
    pub fn new(now: Timestamp, utc_offset_ms: i64) -> Self {
        Self {
            now: AtomicU64::new(now),
            utc_offset_ms: AtomicI64::new(utc_offset_ms),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the UTC offset.
    pub fn set_utc_offset(&self, utc_offset_ms: i64) {
        self.utc_offset_ms.store(utc_offset_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }

    fn utc_offset_ms(&self) -> i64 {
        self.utc_offset_ms.load(Ordering::SeqCst)
    }
}
