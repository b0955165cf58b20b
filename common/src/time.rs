//! Time utilities and timestamp conventions.
//!
//! Converters report their timestamps as Unix seconds, with [`NEVER`]
//! standing in for "no such moment yet".

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Sentinel reported when a timestamp has never been set.
pub const NEVER: i64 = -1;

/// Timing defaults.
pub mod constants {
    use super::Duration;

    /// Default HTTP timeout for a feed fetch (30 seconds).
    pub fn feed_request_timeout() -> Duration {
        Duration::seconds(30)
    }

    /// Default interval between refresh cycles (1 hour).
    pub fn refresh_interval() -> Duration {
        Duration::hours(1)
    }

    /// Default interval between retries after a failed refresh (5 minutes).
    pub fn retry_interval() -> Duration {
        Duration::minutes(5)
    }

    /// Shortest refresh or retry interval a host may configure (1 minute).
    pub fn min_refresh_interval() -> Duration {
        Duration::minutes(1)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Unix seconds for an optional timestamp, [`NEVER`] when absent.
pub fn epoch_seconds(timestamp: Option<Timestamp>) -> i64 {
    timestamp.map(|t| t.timestamp()).unwrap_or(NEVER)
}

/// Inverse of [`epoch_seconds`]; negative values map to `None`.
pub fn from_epoch_seconds(seconds: i64) -> Option<Timestamp> {
    if seconds < 0 {
        return None;
    }
    Utc.timestamp_opt(seconds, 0).single()
}

/// Check whether `timestamp` is absent or further in the past than `max_age`.
pub fn is_older_than(timestamp: Option<Timestamp>, max_age: Duration) -> bool {
    match timestamp {
        Some(t) => now() - t > max_age,
        None => true,
    }
}

/// Duration extensions for convenient construction.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_seconds_sentinel() {
        assert_eq!(epoch_seconds(None), NEVER);
        assert!(epoch_seconds(Some(now())) > 0);
    }

    #[test]
    fn test_epoch_round_trip() {
        let t = Utc.with_ymd_and_hms(2013, 8, 2, 0, 0, 0).unwrap();
        assert_eq!(from_epoch_seconds(epoch_seconds(Some(t))), Some(t));
        assert_eq!(from_epoch_seconds(NEVER), None);
    }

    #[test]
    fn test_is_older_than() {
        assert!(is_older_than(None, Duration::hours(1)));

        let recent = now() - Duration::seconds(10);
        assert!(!is_older_than(Some(recent), Duration::minutes(1)));

        let old = now() - Duration::minutes(10);
        assert!(is_older_than(Some(old), Duration::minutes(1)));
    }

    #[test]
    fn test_negative_duration_as_std() {
        assert_eq!(Duration::seconds(-5).as_std(), std::time::Duration::ZERO);
        assert_eq!(Duration::seconds(5).as_std(), std::time::Duration::from_secs(5));
    }
}
