//! Tempo to tick conversion for soundcards.
//!
//! A sequencer step lasts `absolute_delay` buffers, which is rarely a whole
//! number. The fractional part is spread over a table of per-step delays and
//! attacks (sample offsets into the buffer where a step starts), so that
//! steps stay aligned to the tempo on average.

use alloc::vec;
use alloc::vec::Vec;

use crate::presets::Presets;

/// Number of steps after which the attack pattern repeats.
pub const DEFAULT_PERIOD: usize = 64;

/// Length of the attack and delay tables.
pub const TABLE_LEN: usize = 2 * DEFAULT_PERIOD;

/// Number of buffers one sequencer step lasts:
/// `60 * ((samplerate / buffer_size) / bpm) * ((1 / 16) * (1 / delay_factor))`.
pub fn absolute_delay(samplerate: u32, buffer_size: u32, bpm: f64, delay_factor: f64) -> f64 {
    if buffer_size == 0 || bpm <= 0.0 || delay_factor <= 0.0 {
        return 0.0;
    }
    60.0 * ((samplerate as f64 / buffer_size as f64) / bpm) * ((1.0 / 16.0) * (1.0 / delay_factor))
}

/// Per-step delays (in buffers) and attacks (in frames).
#[derive(Clone, Debug, PartialEq)]
pub struct DelayTable {
    absolute_delay: f64,
    attack: Vec<u32>,
    delay: Vec<f64>,
}

impl DelayTable {
    /// Compute the tables for the given device presets and tempo.
    pub fn compute(presets: &Presets, bpm: f64, delay_factor: f64) -> Self {
        let buffer_size = presets.buffer_size.max(1) as i64;
        let delay = absolute_delay(presets.samplerate, presets.buffer_size, bpm, delay_factor);
        let tact_frames = (delay * buffer_size as f64) as i64;

        let mut attack = vec![0i64; TABLE_LEN];
        attack[0] = libm::floor(0.25 * buffer_size as f64) as i64;

        let next_attack = |current: i64| -> i64 {
            let whole = (current + tact_frames) / buffer_size;
            let next = ((whole as f64 - delay) * buffer_size as f64) as i64;
            next.min(buffer_size - 1)
        };

        let mut next = next_attack(attack[0]);
        for i in 0..TABLE_LEN {
            if i > 0 {
                attack[i] = next;
                next = next_attack(attack[i]);
            }
            // The step drops below zero: push this attack later and the next earlier.
            if next < 0 {
                attack[i] = (attack[i] as f64 - next as f64 / 2.0) as i64;
                attack[i] = attack[i].clamp(0, buffer_size - 1);
                next = ((next as f64) + (next as f64 / 2.0)) as i64;
                next = next.clamp(0, buffer_size - 1);
            }
        }
        attack[0] = attack[TABLE_LEN - 2];

        let mut delays = Vec::with_capacity(TABLE_LEN);
        for i in 0..TABLE_LEN {
            let following = attack[(i + 1) % TABLE_LEN];
            delays.push((tact_frames + attack[i] - following) as f64 / buffer_size as f64);
        }

        Self {
            absolute_delay: delay,
            attack: attack.into_iter().map(|a| a as u32).collect(),
            delay: delays,
        }
    }

    /// Buffers per step before distribution.
    pub fn absolute_delay(&self) -> f64 {
        self.absolute_delay
    }

    /// Delay in buffers of step `index` (wraps).
    pub fn delay(&self, index: usize) -> f64 {
        self.delay[index % TABLE_LEN]
    }

    /// Attack in frames of step `index` (wraps).
    pub fn attack(&self, index: usize) -> u32 {
        self.attack[index % TABLE_LEN]
    }
}
