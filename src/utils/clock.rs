/*!
 * Time source abstraction.
 *
 * Message retention, archive windows and eviction all compare stored
 * timestamps against "now". Routing those reads through [`Clock`] keeps them
 * deterministic in tests.
 */

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// `now - age`, saturating at the earliest representable time
    fn before(&self, age: Duration) -> DateTime<Utc> {
        let age = ChronoDuration::from_std(age).unwrap_or(ChronoDuration::MAX);
        self.now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: Duration) {
        let by = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_before() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(
            clock.before(Duration::from_secs(3600)),
            Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap()
        );

        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 3, 1, 12, 1, 0).unwrap());
    }
}
