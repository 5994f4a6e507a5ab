//! Microsecond-precision timestamp type
//!
//! Timestamps are stored as microseconds since Unix epoch. They stamp history
//! entries and inventory snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Microsecond-precision timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC)
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Create a timestamp for the current moment
    ///
    /// Returns epoch (0) if the system clock is before Unix epoch.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Timestamp of a UTC date-time, clamped to the epoch
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Timestamp(u64::try_from(at.timestamp_micros()).unwrap_or(0))
    }

    /// Create a timestamp from seconds since epoch
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// UTC date-time of this timestamp
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let secs = (self.0 / 1_000_000) as i64;
        let nanos = ((self.0 % 1_000_000) * 1_000) as u32;
        DateTime::<Utc>::from_timestamp(secs, nanos)
    }

    /// RFC 3339 rendering for logs and reports
    pub fn to_rfc3339(&self) -> String {
        self.to_datetime()
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}
