//! Signing timestamps and the skew-aware clock.
//!
//! All signing code takes its notion of "now" from a [`SkewClock`] rather
//! than reading the system clock directly. The clock carries an atomic
//! offset that the execution pipeline adjusts exactly once when the service
//! rejects a request for clock skew; every signature computed afterwards
//! uses the corrected time. Keeping the offset in an injected value (rather
//! than process-global state) lets tests create and inspect their own
//! clocks without leaking between each other.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

/// Long timestamp format carried in the `X-Tos-Date` header and in
/// presigned URLs, e.g. `20230801T121530Z`.
pub const LONG_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Short date format used in the credential scope, e.g. `20230801`.
pub const SHORT_DATE_FORMAT: &str = "%Y%m%d";

/// Format a timestamp in the long signing form.
#[must_use]
pub fn format_long_date(t: DateTime<Utc>) -> String {
    t.format(LONG_DATE_FORMAT).to_string()
}

/// Format a timestamp in the short credential-scope form.
#[must_use]
pub fn format_short_date(t: DateTime<Utc>) -> String {
    t.format(SHORT_DATE_FORMAT).to_string()
}

/// A clock whose output can be shifted to compensate for client/server
/// clock skew.
///
/// Cloning shares the underlying offset; all clones observe a correction
/// applied through any of them.
///
/// # Examples
///
/// ```
/// use tos_core::time::SkewClock;
///
/// let clock = SkewClock::new();
/// clock.set_offset_seconds(120);
/// let skewed = clock.now();
/// let raw = chrono::Utc::now();
/// assert!((skewed - raw).num_seconds() >= 119);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SkewClock {
    offset_secs: Arc<AtomicI64>,
}

impl SkewClock {
    /// Create a clock with no offset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time with the skew offset applied.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(self.offset_secs.load(Ordering::Acquire))
    }

    /// Current offset in seconds.
    #[must_use]
    pub fn offset_seconds(&self) -> i64 {
        self.offset_secs.load(Ordering::Acquire)
    }

    /// Replace the offset.
    pub fn set_offset_seconds(&self, offset: i64) {
        self.offset_secs.store(offset, Ordering::Release);
    }

    /// Set the offset so that `self.now()` tracks `server_time` as observed
    /// at local time `local_time`.
    ///
    /// The offset is rounded to the nearest second; truncating would leave
    /// the corrected clock up to a second behind the server.
    pub fn correct_to(&self, server_time: DateTime<Utc>, local_time: DateTime<Utc>) {
        let millis = (server_time - local_time).num_milliseconds();
        let offset = if millis >= 0 {
            (millis + 500) / 1000
        } else {
            (millis - 500) / 1000
        };
        self.set_offset_seconds(offset);
    }
}
