//! Spin, then yield, then park.

use std::hint;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::IdleConfig;

/// Progressive backoff for a thread with nothing to do.
///
/// Parking uses `park_timeout`, so an `unpark` from another thread wakes
/// the waiter immediately.
pub(crate) struct Idle {
    config: IdleConfig,
    round: u32,
}

impl Idle {
    pub fn new(config: &IdleConfig) -> Self {
        Self {
            config: config.clone(),
            round: 0,
        }
    }

    /// Work arrived: start over at the spin phase.
    pub fn reset(&mut self) {
        self.round = 0;
    }

    /// Back off once.
    pub fn snooze(&mut self) {
        self.snooze_for(self.config.park_timeout);
    }

    /// Back off once, never parking past `deadline`.
    pub fn snooze_until(&mut self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.snooze_for(remaining.min(self.config.park_timeout));
    }

    fn snooze_for(&mut self, park: Duration) {
        let spin = self.config.spin_iterations;
        let yields = spin.saturating_add(self.config.yield_iterations);
        if self.round < spin {
            hint::spin_loop();
        } else if self.round < yields {
            thread::yield_now();
        } else if !park.is_zero() {
            thread::park_timeout(park);
        }
        self.round = self.round.saturating_add(1);
    }

    #[cfg(test)]
    fn is_parking(&self) -> bool {
        self.round >= self.config.spin_iterations + self.config.yield_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_to_parking_and_resets() {
        let config = IdleConfig {
            spin_iterations: 2,
            yield_iterations: 2,
            park_timeout: Duration::from_micros(10),
        };
        let mut idle = Idle::new(&config);
        for _ in 0..4 {
            assert!(!idle.is_parking());
            idle.snooze();
        }
        assert!(idle.is_parking());
        idle.reset();
        assert!(!idle.is_parking());
    }

    #[test]
    fn snooze_until_respects_a_past_deadline() {
        let config = IdleConfig {
            spin_iterations: 0,
            yield_iterations: 0,
            park_timeout: Duration::from_secs(10),
        };
        let mut idle = Idle::new(&config);
        let start = Instant::now();
        idle.snooze_until(start);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
