//! Tempo position shared by soundcards and sequencers.
//!
//! One call to [`Transport::tic`] happens per device buffer. Every
//! `delay[tic_counter]` buffers the note offset moves one sequencer step.

use tw_ir::timing::DEFAULT_PERIOD;
use tw_ir::{DelayTable, Presets, DEFAULT_BPM, DEFAULT_DELAY_FACTOR};

#[derive(Clone, Debug)]
pub struct Transport {
    bpm: f64,
    delay_factor: f64,
    table: DelayTable,
    tic_counter: usize,
    delay_counter: f64,
    tact_counter: f64,
    note_offset: u64,
    note_offset_absolute: u64,
    loop_left: u64,
    loop_right: u64,
    do_loop: bool,
}

impl Transport {
    pub fn new(presets: &Presets) -> Self {
        Self::with_tempo(presets, DEFAULT_BPM, DEFAULT_DELAY_FACTOR)
    }

    pub fn with_tempo(presets: &Presets, bpm: f64, delay_factor: f64) -> Self {
        Self {
            bpm,
            delay_factor,
            table: DelayTable::compute(presets, bpm, delay_factor),
            tic_counter: 0,
            delay_counter: 0.0,
            tact_counter: 0.0,
            note_offset: 0,
            note_offset_absolute: 0,
            loop_left: 0,
            loop_right: 64,
            do_loop: false,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn delay_factor(&self) -> f64 {
        self.delay_factor
    }

    /// Recompute the delay and attack tables for a new tempo.
    pub fn set_tempo(&mut self, presets: &Presets, bpm: f64, delay_factor: f64) {
        self.bpm = bpm;
        self.delay_factor = delay_factor;
        self.table = DelayTable::compute(presets, bpm, delay_factor);
    }

    /// Recompute the tables after a presets change.
    pub fn refresh(&mut self, presets: &Presets) {
        self.table = DelayTable::compute(presets, self.bpm, self.delay_factor);
    }

    pub fn absolute_delay(&self) -> f64 {
        self.table.absolute_delay()
    }

    /// Buffers until the current step ends.
    pub fn delay(&self) -> f64 {
        self.table.delay(self.tic_counter)
    }

    /// Frame offset of the current step inside its buffer.
    pub fn attack(&self) -> u32 {
        self.table.attack(self.tic_counter)
    }

    pub fn table(&self) -> &DelayTable {
        &self.table
    }

    pub fn tic_counter(&self) -> usize {
        self.tic_counter
    }

    pub fn delay_counter(&self) -> f64 {
        self.delay_counter
    }

    pub fn tact_counter(&self) -> f64 {
        self.tact_counter
    }

    pub fn note_offset(&self) -> u64 {
        self.note_offset
    }

    pub fn set_note_offset(&mut self, offset: u64) {
        self.note_offset = offset;
    }

    pub fn note_offset_absolute(&self) -> u64 {
        self.note_offset_absolute
    }

    pub fn set_loop(&mut self, left: u64, right: u64, do_loop: bool) {
        self.loop_left = left;
        self.loop_right = right.max(left + 1);
        self.do_loop = do_loop;
    }

    pub fn loop_range(&self) -> (u64, u64, bool) {
        (self.loop_left, self.loop_right, self.do_loop)
    }

    /// Advance one buffer. Returns `true` when a new step begins.
    pub fn tic(&mut self) -> bool {
        let delay = self.delay();
        if self.delay_counter + 1.0 >= delay.floor() {
            self.note_offset = if self.do_loop && self.note_offset + 1 == self.loop_right {
                self.loop_left
            } else {
                self.note_offset + 1
            };
            self.note_offset_absolute += 1;

            self.tic_counter = (self.tic_counter + 1) % DEFAULT_PERIOD;
            self.delay_counter = self.delay_counter + 1.0 - delay;
            self.tact_counter += 1.0;
            true
        } else {
            self.delay_counter += 1.0;
            false
        }
    }

    /// Back to the first step.
    pub fn rewind(&mut self) {
        self.tic_counter = 0;
        self.delay_counter = 0.0;
        self.tact_counter = 0.0;
        self.note_offset = if self.do_loop { self.loop_left } else { 0 };
        self.note_offset_absolute = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_follow_absolute_delay() {
        let presets = Presets::default();
        let mut t = Transport::new(&presets);
        let buffers = 10_000;
        let steps = (0..buffers).filter(|_| t.tic()).count();

        let expected = buffers as f64 / t.absolute_delay();
        assert!(
            (steps as f64 - expected).abs() < expected * 0.02,
            "{} steps, expected about {}",
            steps,
            expected
        );
        assert_eq!(t.note_offset_absolute(), steps as u64);
    }

    #[test]
    fn loop_wraps_note_offset() {
        let presets = Presets::default();
        let mut t = Transport::new(&presets);
        t.set_loop(0, 4, true);
        let mut seen = Vec::new();
        for _ in 0..200 {
            if t.tic() {
                seen.push(t.note_offset());
            }
        }
        assert!(seen.iter().all(|&o| o < 4));
        assert!(seen.contains(&0));
        assert!(t.note_offset_absolute() > 4);
    }

    #[test]
    fn faster_tempo_steps_sooner() {
        let presets = Presets::default();
        let slow = Transport::with_tempo(&presets, 60.0, 0.25);
        let fast = Transport::with_tempo(&presets, 240.0, 0.25);
        assert!(fast.absolute_delay() < slow.absolute_delay());
    }
}
