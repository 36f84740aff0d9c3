//! Rate-limit backoff governor.
//!
//! Shared by every exchange call in the loop. A 429 grows the backoff
//! geometrically toward the configured ceiling; each clean loop shrinks it
//! until it clears. The deadline only ever extends, so overlapping 429s
//! inside one loop cannot shorten an existing wait.

use std::time::{Duration, Instant};

use tracing::info;

#[derive(Debug)]
pub struct RateLimitGovernor {
    initial_ms: f64,
    max_ms: f64,
    backoff_ms: f64,
    limited_until: Option<Instant>,
    limited_this_loop: bool,
}

impl RateLimitGovernor {
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_ms: initial_ms as f64,
            max_ms: max_ms as f64,
            backoff_ms: 0.0,
            limited_until: None,
            limited_this_loop: false,
        }
    }

    /// Reset the per-loop flag at the top of each iteration.
    pub fn begin_loop(&mut self) {
        self.limited_this_loop = false;
    }

    /// A 429 was observed: grow the backoff and extend the deadline.
    pub fn note_rate_limit(&mut self, now: Instant) {
        self.limited_this_loop = true;
        self.backoff_ms = if self.backoff_ms <= 0.0 {
            self.initial_ms
        } else {
            (self.backoff_ms * 1.5).min(self.max_ms)
        };
        let deadline = now + Duration::from_millis(self.backoff_ms as u64);
        self.limited_until = Some(match self.limited_until {
            Some(existing) => existing.max(deadline),
            None => deadline,
        });
        info!(backoff_ms = self.backoff_ms as u64, "Rate limited; backing off");
    }

    /// A loop completed without hitting the limit: decay the backoff, and
    /// clear it entirely once it falls below half the initial value.
    pub fn note_success(&mut self) {
        if self.limited_this_loop {
            return;
        }
        if self.backoff_ms > 0.0 {
            self.backoff_ms = (self.backoff_ms * 0.5 - self.initial_ms * 0.25).max(0.0);
            if self.backoff_ms < self.initial_ms * 0.5 {
                self.backoff_ms = 0.0;
                self.limited_until = None;
            }
        }
    }

    /// How long the loop must still sleep before issuing requests.
    pub fn wait_duration(&self, now: Instant) -> Option<Duration> {
        self.limited_until
            .filter(|deadline| *deadline > now)
            .map(|deadline| deadline - now)
    }

    pub fn backoff_ms(&self) -> u64 {
        self.backoff_ms as u64
    }

    pub fn is_limited(&self, now: Instant) -> bool {
        self.wait_duration(now).is_some()
    }
}
