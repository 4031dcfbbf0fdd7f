//! Deadline clock for tick-driven threads.

use std::time::{Duration, Instant};

/// Ticks behind schedule after which the clock gives up catching up and
/// re-anchors on the current time.
const MAX_CATCH_UP: u32 = 32;

/// Result of waiting for the next tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// Slept until the deadline.
    OnTime,
    /// The deadline had already passed; the tick runs immediately.
    Late,
    /// Too far behind; the schedule was reset.
    Resynced,
}

/// Absolute-deadline ticker. Deadlines advance by a fixed period, so late
/// ticks are followed by immediate ones until the schedule is met again.
#[derive(Debug)]
pub struct TickClock {
    period: Duration,
    next: Instant,
}

impl TickClock {
    pub fn new(frequency: f64) -> Self {
        Self {
            period: period_of(frequency),
            next: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Change the tick rate, keeping the current deadline.
    pub fn set_frequency(&mut self, frequency: f64) {
        self.period = period_of(frequency);
    }

    /// Sleep until the next deadline and advance it.
    pub fn wait(&mut self) -> Wake {
        let now = Instant::now();
        let wake = if now < self.next {
            std::thread::sleep(self.next - now);
            Wake::OnTime
        } else if now - self.next > self.period * MAX_CATCH_UP {
            self.next = now;
            Wake::Resynced
        } else {
            Wake::Late
        };
        self.next += self.period;
        wake
    }
}

/// Period of one tick at `frequency` Hz.
pub fn period_of(frequency: f64) -> Duration {
    if frequency <= 0.0 || !frequency.is_finite() {
        return Duration::from_secs(1);
    }
    Duration::from_secs_f64(1.0 / frequency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_from_frequency() {
        assert_eq!(period_of(100.0), Duration::from_millis(10));
        assert_eq!(period_of(0.0), Duration::from_secs(1));
        assert_eq!(period_of(f64::NAN), Duration::from_secs(1));
    }

    #[test]
    fn late_ticks_catch_up() {
        let mut clock = TickClock::new(1000.0);
        std::thread::sleep(Duration::from_millis(5));
        // Several ticks are already due and run without sleeping.
        assert_eq!(clock.wait(), Wake::Late);
        assert_eq!(clock.wait(), Wake::Late);
    }

    #[test]
    fn far_behind_resyncs() {
        let mut clock = TickClock::new(10_000.0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.wait(), Wake::Resynced);
        assert_ne!(clock.wait(), Wake::Resynced);
    }
}
