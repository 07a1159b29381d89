use crate::clock::to_chrono;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Pacing state for one host
///
/// Tracks when the next request may be issued and how many anti-automation
/// responses have been seen in a row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleState {
    /// No request to this host before this instant
    pub next_allowed_at: Option<DateTime<Utc>>,

    /// Consecutive WAF-class responses
    pub strike_count: u32,
}

impl ThrottleState {
    /// Creates an empty state: no pending delay, no strikes
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a request issued at `now` must wait
    pub fn wait_at(&self, now: DateTime<Utc>) -> Duration {
        match self.next_allowed_at {
            Some(next) if next > now => (next - now).to_std().unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }

    /// Schedules the next request `delay` after `now`
    pub fn schedule(&mut self, now: DateTime<Utc>, delay: Duration) {
        self.next_allowed_at = Some(
            now.checked_add_signed(to_chrono(delay))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        );
    }

    /// Records a normal response: plain spacing, strikes cleared
    pub fn record_ok(&mut self, now: DateTime<Utc>, crawl_delay: Duration) {
        self.strike_count = 0;
        self.schedule(now, crawl_delay);
    }

    /// Records a WAF-class response and returns the cool-off applied
    ///
    /// The cool-off is `base * 2^(strikes - 1)`, capped at `max`.
    pub fn record_strike(&mut self, now: DateTime<Utc>, base: Duration, max: Duration) -> Duration {
        self.strike_count = self.strike_count.saturating_add(1);
        let delay = backoff(self.strike_count, base, max);
        self.schedule(now, delay);
        delay
    }
}

/// Exponential backoff for the given strike number (1-based), capped at `max`
pub fn backoff(strike: u32, base: Duration, max: Duration) -> Duration {
    let exponent = strike.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}
