use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Fetch health of a feed, derived from its consecutive error count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Degraded(u32),
    /// Too many errors in a row. The feed is still retried, but its items
    /// are not handed out at random.
    Quarantined(u32),
}

impl Health {
    pub fn classify(errors: u32, quarantine_threshold: u32) -> Self {
        match errors {
            0 => Health::Healthy,
            n if n < quarantine_threshold => Health::Degraded(n),
            n => Health::Quarantined(n),
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Healthy => write!(f, "healthy"),
            Health::Degraded(n) => write!(f, "degraded ({n} errors)"),
            Health::Quarantined(n) => write!(f, "quarantined ({n} errors)"),
        }
    }
}

/// Linear backoff: every consecutive error pushes the next attempt back by
/// one more base interval.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// `None` when the delay does not fit in a `Duration`.
    pub fn delay(&self, errors: u32) -> Option<Duration> {
        let steps = i32::try_from(errors.saturating_add(1)).unwrap_or(i32::MAX);
        self.base.checked_mul(steps)
    }

    /// When a feed becomes due again. Never-fetched feeds are due at once;
    /// a due date past the representable range means never.
    pub fn next_due(&self, fetched: Option<DateTime<Utc>>, errors: u32) -> Option<DateTime<Utc>> {
        fetched.map(|fetched| {
            self.delay(errors)
                .and_then(|delay| fetched.checked_add_signed(delay))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    pub fn is_due(&self, fetched: Option<DateTime<Utc>>, errors: u32, now: DateTime<Utc>) -> bool {
        self.next_due(fetched, errors)
            .map_or(true, |due| now >= due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_threshold() {
        assert_eq!(Health::classify(0, 5), Health::Healthy);
        assert_eq!(Health::classify(1, 5), Health::Degraded(1));
        assert_eq!(Health::classify(4, 5), Health::Degraded(4));
        assert_eq!(Health::classify(5, 5), Health::Quarantined(5));
        assert_eq!(Health::classify(12, 5), Health::Quarantined(12));
    }

    #[test]
    fn due_exactly_at_the_boundary() {
        let backoff = Backoff::new(Duration::days(1));
        let fetched = Utc::now();

        for errors in 0..4 {
            let boundary = fetched + Duration::days(i64::from(errors) + 1);
            assert!(!backoff.is_due(Some(fetched), errors, boundary - Duration::seconds(1)));
            assert!(backoff.is_due(Some(fetched), errors, boundary));
        }
    }

    #[test]
    fn never_fetched_is_due() {
        let backoff = Backoff::new(Duration::hours(24));
        assert!(backoff.is_due(None, 3, Utc::now()));
        assert_eq!(backoff.next_due(None, 3), None);
    }

    #[test]
    fn healthy_feed_waits_one_interval() {
        let backoff = Backoff::new(Duration::hours(24));
        assert_eq!(backoff.delay(0), Some(Duration::hours(24)));
        assert_eq!(backoff.delay(2), Some(Duration::hours(72)));
    }

    #[test]
    fn out_of_range_due_date_is_never_due() {
        let backoff = Backoff::new(Duration::hours(4_000_000_000));
        let fetched = Utc::now();

        assert!(!backoff.is_due(Some(fetched), 0, fetched + Duration::days(365)));
        assert!(!backoff.is_due(Some(fetched), u32::MAX, fetched));
        assert_eq!(backoff.next_due(Some(fetched), 3), Some(DateTime::<Utc>::MAX_UTC));
        assert!(backoff.is_due(None, u32::MAX, fetched));
    }
}
