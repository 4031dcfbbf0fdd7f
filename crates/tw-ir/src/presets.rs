//! Soundcard presets: channel count, sample rate, buffer size and format.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default number of PCM channels.
pub const DEFAULT_PCM_CHANNELS: u16 = 2;

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLERATE: u32 = 44_100;

/// Default buffer size in frames.
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default tempo in beats per minute.
pub const DEFAULT_BPM: f64 = 120.0;

/// Default delay factor (a sixteenth note counts as one step at 1/4).
pub const DEFAULT_DELAY_FACTOR: f64 = 1.0 / 4.0;

/// Sample format of a device or signal.
///
/// Signal data is always processed as `f32`; the format only decides how
/// samples are quantized at the device boundary and in exports.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    S8,
    #[default]
    S16,
    S24,
    S32,
    S64,
    Float,
    Double,
}

impl SampleFormat {
    /// Bits per sample.
    pub const fn bits(self) -> u16 {
        match self {
            SampleFormat::S8 => 8,
            SampleFormat::S16 => 16,
            SampleFormat::S24 => 24,
            SampleFormat::S32 | SampleFormat::Float => 32,
            SampleFormat::S64 | SampleFormat::Double => 64,
        }
    }

    /// Bytes per sample.
    pub const fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Whether samples are stored as floating point.
    pub const fn is_float(self) -> bool {
        matches!(self, SampleFormat::Float | SampleFormat::Double)
    }

    /// Parse a short name such as `s16` or `float`.
    pub fn from_name(name: &str) -> Option<Self> {
        let format = match name {
            "s8" => SampleFormat::S8,
            "s16" => SampleFormat::S16,
            "s24" => SampleFormat::S24,
            "s32" => SampleFormat::S32,
            "s64" => SampleFormat::S64,
            "float" | "f32" => SampleFormat::Float,
            "double" | "f64" => SampleFormat::Double,
            _ => return None,
        };
        Some(format)
    }
}

/// Presets shared by soundcards, audios, channels, recyclings and signals.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Presets {
    pub pcm_channels: u16,
    pub samplerate: u32,
    pub buffer_size: u32,
    pub format: SampleFormat,
}

impl Default for Presets {
    fn default() -> Self {
        Self {
            pcm_channels: DEFAULT_PCM_CHANNELS,
            samplerate: DEFAULT_SAMPLERATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            format: SampleFormat::S16,
        }
    }
}

impl Presets {
    pub const fn new(pcm_channels: u16, samplerate: u32, buffer_size: u32, format: SampleFormat) -> Self {
        Self {
            pcm_channels,
            samplerate,
            buffer_size,
            format,
        }
    }

    /// Tick frequency needed to keep up with this device:
    /// `ceil(samplerate / buffer_size) + overclock`.
    pub fn frequency(&self, overclock: f64) -> f64 {
        if self.buffer_size == 0 {
            return overclock.max(1.0);
        }
        libm::ceil(self.samplerate as f64 / self.buffer_size as f64) + overclock
    }

    /// Duration of one buffer in seconds.
    pub fn buffer_seconds(&self) -> f64 {
        if self.samplerate == 0 {
            return 0.0;
        }
        self.buffer_size as f64 / self.samplerate as f64
    }

    /// Whether the presets describe a usable device configuration.
    pub fn is_valid(&self) -> bool {
        self.pcm_channels > 0 && self.samplerate > 0 && self.buffer_size > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_device_defaults() {
        let p = Presets::default();
        assert_eq!(p.pcm_channels, 2);
        assert_eq!(p.samplerate, 44_100);
        assert_eq!(p.buffer_size, 512);
        assert_eq!(p.format, SampleFormat::S16);
        assert!(p.is_valid());
    }

    #[test]
    fn frequency_rounds_up() {
        let p = Presets::default();
        // 44100 / 512 = 86.13...
        assert_eq!(p.frequency(0.0), 87.0);
        assert_eq!(p.frequency(2.0), 89.0);
    }

    #[test]
    fn format_names() {
        assert_eq!(SampleFormat::from_name("s24"), Some(SampleFormat::S24));
        assert_eq!(SampleFormat::from_name("double"), Some(SampleFormat::Double));
        assert_eq!(SampleFormat::from_name("u8"), None);
        assert_eq!(SampleFormat::S24.bytes(), 3);
        assert!(SampleFormat::Float.is_float());
    }
}
