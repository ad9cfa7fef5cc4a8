//! Session clock: last genuine user interaction and idle classification.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Idle time after which the next connect starts a new conversation.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Source of "now" for the controller.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for driving timeouts deterministically. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut g) = self.now.lock() {
            *g = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut g) = self.now.lock() {
            if let Ok(delta) = chrono::Duration::from_std(by) {
                *g += delta;
            }
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|g| *g).unwrap_or_else(|_| Utc::now())
    }
}

/// How the current conversation relates to the idle timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No genuine interaction recorded yet.
    Fresh,
    /// Last interaction is within the timeout.
    Active,
    /// Last interaction is older than the timeout.
    Expired,
}

#[derive(Debug, Clone, Default)]
pub struct SessionClock {
    last_interaction: Option<DateTime<Utc>>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_interaction(&self) -> Option<DateTime<Utc>> {
        self.last_interaction
    }

    pub fn record_interaction(&mut self, now: DateTime<Utc>) {
        self.last_interaction = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_interaction = None;
    }

    pub fn classify(&self, now: DateTime<Utc>, timeout: Duration) -> Freshness {
        let Some(last) = self.last_interaction else {
            return Freshness::Fresh;
        };
        // A negative elapsed time (clock moved backwards) counts as active.
        match (now - last).to_std() {
            Ok(elapsed) if elapsed > timeout => Freshness::Expired,
            _ => Freshness::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn unset_is_fresh() {
        let clock = SessionClock::new();
        assert_eq!(clock.classify(t0(), DEFAULT_IDLE_TIMEOUT), Freshness::Fresh);
    }

    #[test]
    fn boundary_is_active_and_one_past_is_expired() {
        let mut clock = SessionClock::new();
        clock.record_interaction(t0());
        let at_limit = t0() + chrono::Duration::minutes(10);
        assert_eq!(clock.classify(at_limit, DEFAULT_IDLE_TIMEOUT), Freshness::Active);
        let past = at_limit + chrono::Duration::milliseconds(1);
        assert_eq!(clock.classify(past, DEFAULT_IDLE_TIMEOUT), Freshness::Expired);
    }

    #[test]
    fn clock_moving_backwards_stays_active() {
        let mut clock = SessionClock::new();
        clock.record_interaction(t0());
        let earlier = t0() - chrono::Duration::hours(1);
        assert_eq!(clock.classify(earlier, DEFAULT_IDLE_TIMEOUT), Freshness::Active);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(t0());
        let other = clock.clone();
        clock.advance(Duration::from_secs(30));
        assert_eq!(other.now(), t0() + chrono::Duration::seconds(30));
    }
}
