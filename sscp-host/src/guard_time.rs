//! Stateful rate-limiter used to throttle the slow `ScanGlobal` and
//! `ScanARaw` commands. Uses [`std::time::Instant`] (monotonic); wall-clock
//! adjustments do not affect it.

use std::thread;
use std::time::{Duration, Instant};

/// Minimum wall-clock interval enforced between two `ScanGlobal`/`ScanARaw`
/// calls, per spec.md §4.2.
pub const SCAN_GUARD_TIME: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub struct GuardTime {
    armed_until: Option<Instant>,
}

impl GuardTime {
    pub fn new() -> Self {
        Self { armed_until: None }
    }

    /// Blocks until any previously armed guard has elapsed, then arms a new
    /// guard of `duration` starting now.
    pub fn guard(&mut self, duration: Duration) {
        self.wait();
        self.armed_until = Some(Instant::now() + duration);
    }

    /// Blocks until any previously armed guard has elapsed, consuming the
    /// arm without re-arming.
    pub fn wait(&mut self) {
        if let Some(until) = self.armed_until.take() {
            let now = Instant::now();
            if until > now {
                thread::sleep(until - now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_guard_waits_for_first() {
        let mut gt = GuardTime::new();
        let start = Instant::now();
        gt.guard(Duration::from_millis(60));
        gt.guard(Duration::from_millis(0));
        assert!(start.elapsed() >= Duration::from_millis(55));
    }

    #[test]
    fn unarmed_guard_does_not_block() {
        let mut gt = GuardTime::new();
        let start = Instant::now();
        gt.wait();
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn wait_consumes_the_arm_without_rearming() {
        let mut gt = GuardTime::new();
        gt.guard(Duration::from_millis(20));
        gt.wait();
        // `wait` does not rearm, so a second `wait` returns immediately.
        let start = Instant::now();
        gt.wait();
        assert!(start.elapsed() < Duration::from_millis(10));
    }
}
