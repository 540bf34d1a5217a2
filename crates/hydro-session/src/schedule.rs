//! Interval timers driven by an injected clock.

use std::time::{Duration, Instant};

/// A repeating action that is due at most once per interval.
///
/// Stopped timers never fire. A late `fire` does not try to catch up on
/// missed intervals; the next deadline is counted from the time it fired.
#[derive(Debug, Clone)]
pub struct Periodic {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Periodic {
    /// A stopped timer.
    pub fn new(interval: Duration) -> Self {
        Periodic {
            interval,
            next_due: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Start the timer with its first deadline at `first_due`.
    pub fn start_at(&mut self, first_due: Instant) {
        self.next_due = Some(first_due);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    /// Pull the next deadline forward to `at`. Never pushes it back, and
    /// does nothing while stopped.
    pub fn schedule_at(&mut self, at: Instant) {
        if let Some(due) = self.next_due {
            if at < due {
                self.next_due = Some(at);
            }
        }
    }

    /// Returns true if the timer is due, and reschedules it one interval out.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_never_fires() {
        let mut timer = Periodic::new(Duration::from_secs(3));
        assert!(!timer.fire(Instant::now()));
        timer.schedule_at(Instant::now());
        assert!(!timer.is_running());
    }

    #[test]
    fn test_fires_once_per_interval() {
        let start = Instant::now();
        let mut timer = Periodic::new(Duration::from_secs(3));
        timer.start_at(start);

        assert!(timer.fire(start));
        assert!(!timer.fire(start + Duration::from_secs(2)));
        assert!(timer.fire(start + Duration::from_secs(3)));
        // Late by a whole interval: fires once, no catch-up.
        assert!(timer.fire(start + Duration::from_secs(10)));
        assert!(!timer.fire(start + Duration::from_secs(11)));
        assert_eq!(timer.next_due(), Some(start + Duration::from_secs(13)));
    }

    #[test]
    fn test_schedule_at_only_pulls_forward() {
        let start = Instant::now();
        let mut timer = Periodic::new(Duration::from_secs(60));
        timer.start_at(start + Duration::from_secs(60));

        timer.schedule_at(start + Duration::from_secs(1));
        assert_eq!(timer.next_due(), Some(start + Duration::from_secs(1)));
        timer.schedule_at(start + Duration::from_secs(30));
        assert_eq!(timer.next_due(), Some(start + Duration::from_secs(1)));
    }
}
