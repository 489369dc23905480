use std::time::Duration;

/// Read-time age policy applied to cached entries.
///
/// Entries are never evicted; their age is judged against two thresholds
/// whenever they are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    max_age: Duration,
    stale_after: Duration,
}

impl CachePolicy {
    pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);
    pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(2 * 60);

    /// `stale_after` is clamped to `max_age`.
    pub fn new(max_age: Duration, stale_after: Duration) -> Self {
        Self {
            max_age,
            stale_after: stale_after.min(max_age),
        }
    }

    pub const fn max_age(&self) -> Duration {
        self.max_age
    }

    pub const fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Classify an entry written at `stored_ms` as seen at `now_ms`.
    ///
    /// Timestamps in the future count as age zero.
    pub fn classify(&self, stored_ms: i64, now_ms: i64) -> Freshness {
        let age_ms = now_ms.saturating_sub(stored_ms).max(0);
        let age = Duration::from_millis(u64::try_from(age_ms).unwrap_or(0));

        if age >= self.max_age {
            Freshness::Expired { age }
        } else if age >= self.stale_after {
            Freshness::Stale { age }
        } else {
            Freshness::Fresh { age }
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_AGE, Self::DEFAULT_STALE_AFTER)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh { age: Duration },
    /// Still servable, but old enough that callers may want a background refresh.
    Stale { age: Duration },
    Expired { age: Duration },
}

impl Freshness {
    pub const fn age(&self) -> Duration {
        match self {
            Self::Fresh { age } | Self::Stale { age } | Self::Expired { age } => *age,
        }
    }

    pub const fn is_usable(&self) -> bool {
        !matches!(self, Self::Expired { .. })
    }

    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }

    pub const fn age_minutes(&self) -> u64 {
        self.age().as_secs() / 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE_MS: i64 = 60_000;

    #[test]
    fn classifies_by_age_thresholds() {
        let policy = CachePolicy::default();
        let stored = 10 * MINUTE_MS;

        assert!(matches!(policy.classify(stored, stored + MINUTE_MS), Freshness::Fresh { .. }));
        assert!(matches!(
            policy.classify(stored, stored + 2 * MINUTE_MS),
            Freshness::Stale { .. }
        ));
        assert!(matches!(
            policy.classify(stored, stored + 59 * MINUTE_MS),
            Freshness::Stale { .. }
        ));
        assert!(matches!(
            policy.classify(stored, stored + 60 * MINUTE_MS),
            Freshness::Expired { .. }
        ));
    }

    #[test]
    fn future_timestamps_are_fresh() {
        let policy = CachePolicy::default();
        let freshness = policy.classify(5 * MINUTE_MS, 0);
        assert_eq!(freshness, Freshness::Fresh { age: Duration::ZERO });
    }

    #[test]
    fn reports_whole_minutes() {
        let policy = CachePolicy::default();
        let freshness = policy.classify(0, 7 * MINUTE_MS + 59_000);
        assert_eq!(freshness.age_minutes(), 7);
    }

    #[test]
    fn stale_threshold_never_exceeds_max_age() {
        let policy = CachePolicy::new(Duration::from_secs(60), Duration::from_secs(600));
        assert_eq!(policy.stale_after(), Duration::from_secs(60));
    }
}
