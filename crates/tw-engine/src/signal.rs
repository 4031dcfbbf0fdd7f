//! Audio signals: one mono stream of fixed-size buffers.

use tw_ir::buffer_util;
use tw_ir::{Presets, SampleFormat};

use crate::object::{next_id, ObjectMutex};

/// Signal flags.
pub mod flags {
    /// The resettable default signal of a recycling.
    pub const TEMPLATE: u8 = 1 << 0;
    /// Output of a voice, released when the voice ends.
    pub const VOICE: u8 = 1 << 1;
}

#[derive(Debug)]
pub struct SignalState {
    pub flags: u8,
    /// Voice that produced this signal.
    pub recall_id: Option<u64>,
    pub samplerate: u32,
    pub buffer_size: u32,
    pub format: SampleFormat,
    /// Frame offset of the first sample inside the first buffer.
    pub attack: u32,
    /// Buffers to wait before the stream starts.
    pub delay: f64,
    pub stream: Vec<Vec<f32>>,
    /// Buffer being read or written this tick.
    pub current: Option<usize>,
}

impl SignalState {
    pub fn is_template(&self) -> bool {
        self.flags & flags::TEMPLATE != 0
    }

    pub fn current_buffer(&self) -> Option<&[f32]> {
        self.current
            .and_then(|i| self.stream.get(i))
            .map(Vec::as_slice)
    }

    pub fn current_buffer_mut(&mut self) -> Option<&mut [f32]> {
        match self.current {
            Some(i) => self.stream.get_mut(i).map(Vec::as_mut_slice),
            None => None,
        }
    }

    /// Buffer before the current one, for attack-aligned copies.
    pub fn prev_buffer(&self) -> Option<&[f32]> {
        match self.current {
            Some(i) if i > 0 => self.stream.get(i - 1).map(Vec::as_slice),
            _ => None,
        }
    }

    /// Move to the next buffer. Returns `false` once the stream is exhausted.
    pub fn advance(&mut self) -> bool {
        self.current = match self.current {
            Some(i) if i + 1 < self.stream.len() => Some(i + 1),
            _ => None,
        };
        self.current.is_some()
    }

    pub fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }

    /// All samples, buffer after buffer.
    pub fn samples(&self) -> Vec<f32> {
        self.stream.iter().flatten().copied().collect()
    }

    /// Replace the stream with `samples` split into buffers, shifted by `attack` frames.
    pub fn fill(&mut self, samples: &[f32], attack: u32) {
        self.attack = attack.min(self.buffer_size.saturating_sub(1));
        self.stream = chunk(samples, self.buffer_size as usize, self.attack as usize);
        self.current = if self.stream.is_empty() { None } else { Some(0) };
    }

    /// Resample the whole stream to `samplerate`. Attack is rescaled.
    pub fn set_samplerate(&mut self, samplerate: u32) {
        if samplerate == 0 || samplerate == self.samplerate {
            return;
        }
        let body: Vec<f32> = self.samples().split_off((self.attack as usize).min(self.sample_count()));
        let resampled = buffer_util::resample(&body, self.samplerate, samplerate);
        let attack = buffer_util::rescale_attack(self.attack, self.samplerate, samplerate);
        self.samplerate = samplerate;
        let current = self.current;
        self.fill(&resampled, attack);
        self.current = current.map(|c| c.min(self.stream.len().saturating_sub(1)));
    }

    /// Rechunk the stream into buffers of `buffer_size` frames.
    pub fn set_buffer_size(&mut self, buffer_size: u32) {
        if buffer_size == 0 || buffer_size == self.buffer_size {
            return;
        }
        let body: Vec<f32> = self.samples().split_off((self.attack as usize).min(self.sample_count()));
        let position = self.current.map(|c| c * self.buffer_size as usize);
        self.buffer_size = buffer_size;
        let attack = self.attack;
        self.fill(&body, attack);
        self.current = position.map(|p| (p / buffer_size as usize).min(self.stream.len().saturating_sub(1)));
    }

    pub fn sample_count(&self) -> usize {
        self.stream.iter().map(Vec::len).sum()
    }
}

fn chunk(samples: &[f32], buffer_size: usize, attack: usize) -> Vec<Vec<f32>> {
    if samples.is_empty() || buffer_size == 0 {
        return Vec::new();
    }
    let total = attack + samples.len();
    let buffers = total.div_ceil(buffer_size);
    let mut stream = vec![vec![0.0; buffer_size]; buffers];
    for (i, s) in samples.iter().enumerate() {
        let pos = attack + i;
        stream[pos / buffer_size][pos % buffer_size] = *s;
    }
    stream
}

/// One stream of sample buffers inside a recycling.
#[derive(Debug)]
pub struct AudioSignal {
    id: u64,
    state: ObjectMutex<SignalState>,
}

impl AudioSignal {
    pub fn new(presets: &Presets, recall_id: Option<u64>) -> Self {
        Self {
            id: next_id(),
            state: ObjectMutex::new(SignalState {
                flags: if recall_id.is_some() { flags::VOICE } else { 0 },
                recall_id,
                samplerate: presets.samplerate,
                buffer_size: presets.buffer_size,
                format: presets.format,
                attack: 0,
                delay: 0.0,
                stream: Vec::new(),
                current: None,
            }),
        }
    }

    /// A silent template with an empty stream.
    pub fn template(presets: &Presets) -> Self {
        let signal = Self::new(presets, None);
        signal.state.with_mut(|s| s.flags |= flags::TEMPLATE);
        signal
    }

    /// A template holding `samples`.
    pub fn template_from_samples(presets: &Presets, samples: &[f32]) -> Self {
        let signal = Self::template(presets);
        signal.state.with_mut(|s| {
            s.fill(samples, 0);
            s.current = None;
        });
        signal
    }

    /// A voice signal with the template's samples, starting `attack` frames
    /// into the first buffer.
    pub fn from_template(template: &AudioSignal, recall_id: u64, attack: u32) -> Self {
        let (presets, samples) = template.with(|t| {
            (
                Presets::new(1, t.samplerate, t.buffer_size, t.format),
                t.samples(),
            )
        });
        let signal = Self::new(&presets, Some(recall_id));
        signal.state.with_mut(|s| s.fill(&samples, attack));
        signal
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn with<R>(&self, f: impl FnOnce(&SignalState) -> R) -> R {
        self.state.with(f)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut SignalState) -> R) -> R {
        self.state.with_mut(f)
    }

    pub fn is_template(&self) -> bool {
        self.with(SignalState::is_template)
    }

    pub fn recall_id(&self) -> Option<u64> {
        self.with(|s| s.recall_id)
    }

    pub fn belongs_to(&self, recall_id: u64) -> bool {
        self.recall_id() == Some(recall_id)
    }

    pub fn len(&self) -> usize {
        self.with(|s| s.stream.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_exhausted(&self) -> bool {
        self.with(SignalState::is_exhausted)
    }

    pub fn presets(&self) -> Presets {
        self.with(|s| Presets::new(1, s.samplerate, s.buffer_size, s.format))
    }

    /// Apply new presets: resample on rate changes, rechunk on size changes.
    pub fn apply_presets(&self, presets: &Presets) {
        self.with_mut(|s| {
            s.set_samplerate(presets.samplerate);
            s.set_buffer_size(presets.buffer_size);
            s.format = presets.format;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presets(rate: u32, size: u32) -> Presets {
        Presets::new(1, rate, size, SampleFormat::S16)
    }

    #[test]
    fn fill_splits_into_buffers_with_attack() {
        let signal = AudioSignal::new(&presets(8000, 4), Some(1));
        signal.with_mut(|s| s.fill(&[1.0; 6], 2));
        signal.with(|s| {
            assert_eq!(s.stream.len(), 2);
            assert_eq!(s.stream[0], vec![0.0, 0.0, 1.0, 1.0]);
            assert_eq!(s.stream[1], vec![1.0, 1.0, 1.0, 1.0]);
            assert_eq!(s.current, Some(0));
        });
    }

    #[test]
    fn advance_until_exhausted() {
        let signal = AudioSignal::new(&presets(8000, 4), Some(1));
        signal.with_mut(|s| s.fill(&[0.5; 9], 0));
        assert_eq!(signal.len(), 3);
        assert!(signal.with_mut(|s| s.advance()));
        assert!(signal.with_mut(|s| s.advance()));
        assert!(!signal.with_mut(|s| s.advance()));
        assert!(signal.is_exhausted());
    }

    #[test]
    fn template_is_not_playing() {
        let t = AudioSignal::template_from_samples(&presets(8000, 4), &[0.25; 8]);
        assert!(t.is_template());
        assert!(t.is_exhausted());
        assert_eq!(t.len(), 2);

        let voice = AudioSignal::from_template(&t, 7, 1);
        assert!(!voice.is_template());
        assert!(voice.belongs_to(7));
        assert_eq!(voice.len(), 3);
        assert_eq!(voice.with(|s| s.current), Some(0));
    }

    #[test]
    fn samplerate_change_resamples() {
        let signal = AudioSignal::new(&presets(22_050, 64), Some(1));
        signal.with_mut(|s| s.fill(&[0.5; 640], 0));
        signal.apply_presets(&presets(44_100, 64));
        signal.with(|s| {
            assert_eq!(s.samplerate, 44_100);
            assert_eq!(s.sample_count(), 1280);
        });
    }

    #[test]
    fn buffer_size_change_rechunks() {
        let signal = AudioSignal::new(&presets(8000, 4), Some(1));
        signal.with_mut(|s| s.fill(&[1.0; 16], 0));
        signal.apply_presets(&presets(8000, 8));
        signal.with(|s| {
            assert_eq!(s.stream.len(), 2);
            assert!(s.stream.iter().all(|b| b.len() == 8));
        });
    }
}
