//! Tick telemetry for deadline monitoring.
//!
//! Collects tick durations in a fixed ring without allocating, and counts
//! ticks that overran their budget. Overruns are not errors: the clock
//! catches up on later ticks, the counter only makes sustained lag visible.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Ring buffer size for tick duration samples.
const TICK_BUFFER_SIZE: usize = 256;

/// Summary of a telemetry window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TelemetrySummary {
    pub avg_us: u32,
    pub max_us: u32,
    pub p95_us: u32,
    /// Cumulative, never reset
    pub overruns: u64,
}

/// Per-thread tick duration collector.
pub struct TickTelemetry {
    tick_durations_us: [u32; TICK_BUFFER_SIZE],
    tick_idx: usize,
    max_tick_us: u32,
    sample_count: usize,
    overruns: AtomicU64,
}

impl Default for TickTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TickTelemetry {
    pub fn new() -> Self {
        Self {
            tick_durations_us: [0; TICK_BUFFER_SIZE],
            tick_idx: 0,
            max_tick_us: 0,
            sample_count: 0,
            overruns: AtomicU64::new(0),
        }
    }

    /// Record one tick. Returns `true` if it exceeded `budget`.
    #[inline]
    pub fn record(&mut self, duration: Duration, budget: Duration) -> bool {
        let us = duration.as_micros().min(u32::MAX as u128) as u32;

        self.tick_durations_us[self.tick_idx] = us;
        self.tick_idx = (self.tick_idx + 1) % TICK_BUFFER_SIZE;
        if self.sample_count < TICK_BUFFER_SIZE {
            self.sample_count += 1;
        }
        self.max_tick_us = self.max_tick_us.max(us);

        let overrun = duration > budget;
        if overrun {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        overrun
    }

    /// Count an overrun that was not measured by [`record`](Self::record),
    /// e.g. a tick that was still pending when the next one arrived.
    pub fn count_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Summarize the window and reset the max.
    pub fn take_summary(&mut self) -> TelemetrySummary {
        let overruns = self.overruns();
        if self.sample_count == 0 {
            return TelemetrySummary {
                overruns,
                ..TelemetrySummary::default()
            };
        }

        let sum: u64 = self.tick_durations_us[..self.sample_count]
            .iter()
            .map(|&x| x as u64)
            .sum();
        let avg_us = (sum / self.sample_count as u64) as u32;

        let mut sorted = self.tick_durations_us;
        sorted[..self.sample_count].sort_unstable();
        let p95_idx = (self.sample_count * 95 / 100).max(1) - 1;
        let p95_us = sorted[p95_idx.min(self.sample_count - 1)];

        let max_us = self.max_tick_us;
        self.max_tick_us = 0;

        TelemetrySummary {
            avg_us,
            max_us,
            p95_us,
            overruns,
        }
    }
}
