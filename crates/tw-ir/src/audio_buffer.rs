//! Multichannel f32 audio buffer with planar layout.

use alloc::vec;
use alloc::vec::Vec;

use crate::presets::Presets;

/// Maximum number of PCM channels per buffer.
pub const MAX_CHANNELS: u16 = 32;

/// A multichannel f32 audio buffer in planar layout.
///
/// Data is stored as `channels` contiguous planes of `frames` samples each.
/// `data[ch * frames + frame]` gives the sample for channel `ch` at `frame`.
/// Soundcards hold two of these and swap them every tick.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    data: Vec<f32>,
    channels: u16,
    frames: u32,
}

impl AudioBuffer {
    /// Create a new silent buffer with the given dimensions.
    pub fn new(channels: u16, frames: u32) -> Self {
        let channels = channels.min(MAX_CHANNELS);
        Self {
            data: vec![0.0; channels as usize * frames as usize],
            channels,
            frames,
        }
    }

    /// Create a silent buffer sized for `presets`.
    pub fn for_presets(presets: &Presets) -> Self {
        Self::new(presets.pcm_channels, presets.buffer_size)
    }

    /// Fill all samples with zero.
    pub fn silence(&mut self) {
        self.data.fill(0.0);
    }

    /// Reallocate to new dimensions. Contents are cleared.
    pub fn resize(&mut self, channels: u16, frames: u32) {
        let channels = channels.min(MAX_CHANNELS);
        self.channels = channels;
        self.frames = frames;
        self.data.clear();
        self.data.resize(channels as usize * frames as usize, 0.0);
    }

    /// Number of channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Read-only access to one channel's sample data.
    pub fn channel(&self, ch: u16) -> &[f32] {
        let start = ch as usize * self.frames as usize;
        &self.data[start..start + self.frames as usize]
    }

    /// Mutable access to one channel's sample data.
    pub fn channel_mut(&mut self, ch: u16) -> &mut [f32] {
        let start = ch as usize * self.frames as usize;
        let len = self.frames as usize;
        &mut self.data[start..start + len]
    }

    /// Sum a mono plane into channel `ch` with gain. Out of range channels are ignored.
    pub fn mix_into_channel(&mut self, ch: u16, source: &[f32], gain: f32) {
        if ch >= self.channels {
            return;
        }
        let dst = self.channel_mut(ch);
        for (d, s) in dst.iter_mut().zip(source) {
            *d += *s * gain;
        }
    }

    /// Sum overlapping channels from `source` into this buffer.
    pub fn mix_from(&mut self, source: &AudioBuffer) {
        let chs = self.channels.min(source.channels);
        for ch in 0..chs {
            self.mix_into_channel(ch, source.channel(ch), 1.0);
        }
    }

    /// Scale all samples by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        for s in &mut self.data {
            *s *= gain;
        }
    }

    /// Write frames interleaved (`frame * channels + ch`) into `out`.
    ///
    /// Returns the number of samples written.
    pub fn write_interleaved(&self, out: &mut [f32]) -> usize {
        let chs = self.channels as usize;
        if chs == 0 {
            return 0;
        }
        let frames = (out.len() / chs).min(self.frames as usize);
        for frame in 0..frames {
            for ch in 0..chs {
                out[frame * chs + ch] = self.data[ch * self.frames as usize + frame];
            }
        }
        frames * chs
    }

    /// Overwrite from interleaved samples, zero-filling what `input` does not cover.
    pub fn read_interleaved(&mut self, input: &[f32], input_channels: u16) {
        self.silence();
        let in_chs = input_channels as usize;
        if in_chs == 0 {
            return;
        }
        let frames = (input.len() / in_chs).min(self.frames as usize);
        let chs = self.channels.min(input_channels) as usize;
        for frame in 0..frames {
            for ch in 0..chs {
                self.data[ch * self.frames as usize + frame] = input[frame * in_chs + ch];
            }
        }
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.data.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_silent() {
        let buf = AudioBuffer::new(2, 4);
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.frames(), 4);
        assert!(buf.channel(0).iter().all(|&s| s == 0.0));
        assert!(buf.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn channel_mut_writes_correctly() {
        let mut buf = AudioBuffer::new(2, 2);
        buf.channel_mut(0)[0] = 1.0;
        buf.channel_mut(1)[1] = -0.5;
        assert_eq!(buf.channel(0), &[1.0, 0.0]);
        assert_eq!(buf.channel(1), &[0.0, -0.5]);
    }

    #[test]
    fn resize_clears_and_reshapes() {
        let mut buf = AudioBuffer::new(1, 2);
        buf.channel_mut(0)[0] = 1.0;
        buf.resize(2, 3);
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.frames(), 3);
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn mix_into_channel_ignores_missing_channel() {
        let mut buf = AudioBuffer::new(1, 2);
        buf.mix_into_channel(0, &[0.5, 0.25], 2.0);
        buf.mix_into_channel(3, &[1.0, 1.0], 1.0);
        assert_eq!(buf.channel(0), &[1.0, 0.5]);
    }

    #[test]
    fn mix_from_mismatched_sizes_uses_minimum() {
        let mut dst = AudioBuffer::new(2, 4);
        let mut src = AudioBuffer::new(1, 2);
        src.channel_mut(0)[0] = 1.0;
        src.channel_mut(0)[1] = 2.0;

        dst.mix_from(&src);
        assert!((dst.channel(0)[0] - 1.0).abs() < 1e-6);
        assert!((dst.channel(0)[1] - 2.0).abs() < 1e-6);
        assert_eq!(dst.channel(0)[2], 0.0);
        assert_eq!(dst.channel(1)[0], 0.0);
    }

    #[test]
    fn interleave_round_trip() {
        let mut buf = AudioBuffer::new(2, 3);
        buf.channel_mut(0).copy_from_slice(&[0.1, 0.2, 0.3]);
        buf.channel_mut(1).copy_from_slice(&[-0.1, -0.2, -0.3]);

        let mut out = [0.0f32; 6];
        assert_eq!(buf.write_interleaved(&mut out), 6);
        assert_eq!(out, [0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);

        let mut back = AudioBuffer::new(2, 3);
        back.read_interleaved(&out, 2);
        assert_eq!(back, buf);
    }

    #[test]
    fn peak_and_gain() {
        let mut buf = AudioBuffer::new(2, 1);
        buf.channel_mut(0)[0] = 1.0;
        buf.channel_mut(1)[0] = -0.5;
        buf.apply_gain(2.0);
        assert!((buf.peak() - 2.0).abs() < 1e-6);
    }
}
