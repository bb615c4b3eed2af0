//! Cancellable debounce timer.
//!
//! Replaces ad hoc timer-handle juggling with an explicit
//! schedule/cancel/reschedule object. All methods take the current instant
//! as a parameter, so the autosave policy is testable by advancing a
//! simulated clock instead of sleeping.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self { quiet, deadline: None }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    pub fn set_quiet_period(&mut self, quiet: Duration) {
        self.quiet = quiet;
    }

    /// Schedule (or reschedule) the deadline one quiet period after `now`.
    /// A burst of calls collapses into the deadline of the last one.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume the deadline if it has passed. Returns true at most once per
    /// scheduled deadline.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(1500);

    #[test]
    fn fires_only_after_quiet_period() {
        let start = Instant::now();
        let mut timer = Debouncer::new(QUIET);
        timer.schedule(start);

        assert!(!timer.fire_if_due(start));
        assert!(!timer.fire_if_due(start + Duration::from_millis(1499)));
        assert!(timer.fire_if_due(start + QUIET));
        // Consumed: does not fire twice.
        assert!(!timer.fire_if_due(start + Duration::from_secs(10)));
    }

    #[test]
    fn reschedule_counts_from_last_event() {
        let start = Instant::now();
        let mut timer = Debouncer::new(QUIET);
        timer.schedule(start);
        timer.schedule(start + Duration::from_millis(1000));

        // One quiet period after the *first* schedule: not due yet.
        assert!(!timer.fire_if_due(start + QUIET));
        assert!(timer.fire_if_due(start + Duration::from_millis(1000) + QUIET));
    }

    #[test]
    fn cancel_clears_deadline() {
        let start = Instant::now();
        let mut timer = Debouncer::new(QUIET);
        timer.schedule(start);
        assert!(timer.is_pending());

        timer.cancel();
        assert!(!timer.is_pending());
        assert!(!timer.fire_if_due(start + Duration::from_secs(60)));
    }
}
