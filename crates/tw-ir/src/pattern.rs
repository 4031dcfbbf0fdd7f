//! Step patterns for sequencer playback.

use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default number of steps in a pattern (one bar of sixteenths).
pub const DEFAULT_STEPS: u32 = 16;

/// A bank of on/off steps, one row per pad.
///
/// Stored row-major: `steps[pad * length + step]`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    pads: u32,
    length: u32,
    steps: Vec<bool>,
}

impl Pattern {
    /// Create an empty pattern.
    pub fn new(pads: u32, length: u32) -> Self {
        Self {
            pads,
            length,
            steps: alloc::vec![false; pads as usize * length as usize],
        }
    }

    pub fn pads(&self) -> u32 {
        self.pads
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Whether `step` is active for `pad`. Out of range reads are off.
    pub fn is_on(&self, pad: u32, step: u32) -> bool {
        if pad >= self.pads || self.length == 0 {
            return false;
        }
        let step = step % self.length;
        self.steps[(pad * self.length + step) as usize]
    }

    pub fn set(&mut self, pad: u32, step: u32, on: bool) {
        if pad < self.pads && step < self.length {
            self.steps[(pad * self.length + step) as usize] = on;
        }
    }

    pub fn toggle(&mut self, pad: u32, step: u32) {
        let on = self.is_on(pad, step);
        self.set(pad, step, !on);
    }

    /// Change the pad count, keeping existing rows.
    pub fn resize_pads(&mut self, pads: u32) {
        self.steps.resize(pads as usize * self.length as usize, false);
        self.pads = pads;
    }

    /// Active steps of one pad.
    pub fn active_steps(&self, pad: u32) -> impl Iterator<Item = u32> + '_ {
        (0..self.length).filter(move |s| self.is_on(pad, *s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_wrap() {
        let mut pattern = Pattern::new(2, 16);
        pattern.set(1, 4, true);
        assert!(pattern.is_on(1, 4));
        assert!(pattern.is_on(1, 20));
        assert!(!pattern.is_on(0, 4));
        assert!(!pattern.is_on(5, 4));
    }

    #[test]
    fn toggle_and_active_steps() {
        let mut pattern = Pattern::new(1, 8);
        for step in [0, 4] {
            pattern.toggle(0, step);
        }
        assert_eq!(pattern.active_steps(0).collect::<Vec<_>>(), [0, 4]);
        pattern.toggle(0, 0);
        assert_eq!(pattern.active_steps(0).collect::<Vec<_>>(), [4]);
    }

    #[test]
    fn resize_pads_keeps_rows() {
        let mut pattern = Pattern::new(1, 4);
        pattern.set(0, 2, true);
        pattern.resize_pads(3);
        assert_eq!(pattern.pads(), 3);
        assert!(pattern.is_on(0, 2));
        assert!(!pattern.is_on(2, 2));
    }
}
