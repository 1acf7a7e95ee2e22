use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::truncate_millis;
use crate::error::ConfigurationError;

/// One concrete, time-bounded lock request.
///
/// Both expiries are computed from the same reference instant (`created_at`),
/// which is the moment the configuration was resolved, not the moment the
/// store is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfiguration {
    name: String,
    created_at: DateTime<Utc>,
    lock_at_most_until: DateTime<Utc>,
    lock_at_least_until: DateTime<Utc>,
}

impl LockConfiguration {
    /// Build a configuration anchored at `created_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptyName`] for a blank name and
    /// [`ConfigurationError::AtLeastExceedsAtMost`] when the minimum hold is
    /// longer than the staleness ceiling.
    pub fn new(
        created_at: DateTime<Utc>,
        name: impl Into<String>,
        lock_at_most_for: Duration,
        lock_at_least_for: Duration,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        if lock_at_least_for > lock_at_most_for {
            return Err(ConfigurationError::AtLeastExceedsAtMost {
                name,
                at_least_for: lock_at_least_for,
                at_most_for: lock_at_most_for,
            });
        }

        let created_at = truncate_millis(created_at);
        let lock_at_most_until = add(created_at, lock_at_most_for, "lock_at_most_for")?;
        let lock_at_least_until = add(created_at, lock_at_least_for, "lock_at_least_for")?;

        Ok(Self {
            name,
            created_at,
            lock_at_most_until,
            lock_at_least_until,
        })
    }

    /// Identifier of the lock; the key of the shared lock record.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference instant both expiries were computed from.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Instant after which the lock is stale and may be taken over.
    pub fn lock_at_most_until(&self) -> DateTime<Utc> {
        self.lock_at_most_until
    }

    /// Instant before which the lock must not be released.
    pub fn lock_at_least_until(&self) -> DateTime<Utc> {
        self.lock_at_least_until
    }

    pub fn lock_at_most_for(&self) -> Duration {
        (self.lock_at_most_until - self.created_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn lock_at_least_for(&self) -> Duration {
        (self.lock_at_least_until - self.created_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Instant the record may be released to when the task finishes at `now`.
    pub fn unlock_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.lock_at_least_until.max(now)
    }
}

fn add(
    instant: DateTime<Utc>,
    duration: Duration,
    field: &str,
) -> Result<DateTime<Utc>, ConfigurationError> {
    let out_of_range = || ConfigurationError::DurationOutOfRange {
        field: field.to_owned(),
    };
    let delta = TimeDelta::from_std(duration).map_err(|_| out_of_range())?;
    instant
        .checked_add_signed(delta)
        .map(truncate_millis)
        .ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn expiries_share_reference_instant() {
        let cfg = LockConfiguration::new(
            t0(),
            "reportJob",
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(cfg.created_at(), t0());
        assert_eq!(cfg.lock_at_most_until(), t0() + TimeDelta::seconds(60));
        assert_eq!(cfg.lock_at_least_until(), t0() + TimeDelta::seconds(5));
        assert_eq!(cfg.lock_at_most_for(), Duration::from_secs(60));
        assert_eq!(cfg.lock_at_least_for(), Duration::from_secs(5));
    }

    #[test]
    fn rejects_at_least_longer_than_at_most() {
        let err = LockConfiguration::new(
            t0(),
            "job",
            Duration::from_secs(1),
            Duration::from_secs(2),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::AtLeastExceedsAtMost { .. }));
    }

    #[test]
    fn equal_bounds_are_allowed() {
        let cfg =
            LockConfiguration::new(t0(), "job", Duration::from_secs(3), Duration::from_secs(3));
        assert!(cfg.is_ok());
    }

    #[test]
    fn rejects_blank_name() {
        let err =
            LockConfiguration::new(t0(), "  ", Duration::from_secs(1), Duration::ZERO).unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyName);
    }

    #[test]
    fn unlock_time_honors_minimum_hold() {
        let cfg = LockConfiguration::new(
            t0(),
            "job",
            Duration::from_secs(60),
            Duration::from_secs(10),
        )
        .unwrap();
        let early = t0() + TimeDelta::seconds(2);
        let late = t0() + TimeDelta::seconds(30);
        assert_eq!(cfg.unlock_time(early), cfg.lock_at_least_until());
        assert_eq!(cfg.unlock_time(late), late);
    }

    #[test]
    fn huge_duration_is_out_of_range() {
        let err = LockConfiguration::new(t0(), "job", Duration::MAX, Duration::ZERO).unwrap_err();
        assert!(matches!(err, ConfigurationError::DurationOutOfRange { .. }));
    }
}
