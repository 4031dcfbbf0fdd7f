//! Soundcard capability interface.
//!
//! A soundcard exposes a double buffer: recalls mix into the current buffer
//! during a tick, [`Soundcard::play`] hands it to the device and swaps, so
//! [`Soundcard::prev_buffer`] always holds what was played one tick ago.
//! Non-owning threads (export) take the soundcard's mutex for the duration
//! of their access, which brackets it like a buffer lock.

use std::sync::Arc;

use parking_lot::Mutex;
use tw_ir::{AudioBuffer, Presets, DEFAULT_BPM, DEFAULT_DELAY_FACTOR};

use crate::error::{AudioError, AudioResult};
use crate::transport::Transport;

/// State every soundcard backend carries.
#[derive(Debug)]
pub struct SoundcardCore {
    presets: Presets,
    buffers: [AudioBuffer; 2],
    current: usize,
    input: AudioBuffer,
    transport: Transport,
    recording: bool,
    played: u64,
}

impl SoundcardCore {
    pub fn new(presets: Presets) -> Self {
        Self {
            presets,
            buffers: [AudioBuffer::for_presets(&presets), AudioBuffer::for_presets(&presets)],
            current: 0,
            input: AudioBuffer::for_presets(&presets),
            transport: Transport::with_tempo(&presets, DEFAULT_BPM, DEFAULT_DELAY_FACTOR),
            recording: false,
            played: 0,
        }
    }

    pub fn presets(&self) -> Presets {
        self.presets
    }

    /// Reallocate buffers and recompute timing for new presets.
    pub fn set_presets(&mut self, presets: Presets) -> AudioResult<()> {
        if !presets.is_valid() {
            return Err(AudioError::InvalidPresets(format!("{:?}", presets)));
        }
        self.presets = presets;
        for buffer in self.buffers.iter_mut() {
            buffer.resize(presets.pcm_channels, presets.buffer_size);
        }
        self.input.resize(presets.pcm_channels, presets.buffer_size);
        self.transport.refresh(&presets);
        Ok(())
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffers[self.current]
    }

    pub fn buffer_mut(&mut self) -> &mut AudioBuffer {
        &mut self.buffers[self.current]
    }

    pub fn prev_buffer(&self) -> &AudioBuffer {
        &self.buffers[self.current ^ 1]
    }

    pub fn input(&self) -> &AudioBuffer {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut AudioBuffer {
        &mut self.input
    }

    /// Make the just-played buffer the previous one and clear the next.
    pub fn swap_buffers(&mut self) {
        self.current ^= 1;
        self.buffers[self.current].silence();
        self.played += 1;
    }

    /// Buffers handed to the device so far.
    pub fn played(&self) -> u64 {
        self.played
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        let delay_factor = self.transport.delay_factor();
        self.transport.set_tempo(&self.presets, bpm, delay_factor);
    }

    pub fn set_delay_factor(&mut self, delay_factor: f64) {
        let bpm = self.transport.bpm();
        self.transport.set_tempo(&self.presets, bpm, delay_factor);
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }
}

/// A playback/capture device.
///
/// Backends implement device access; buffer and tempo bookkeeping live in
/// the [`SoundcardCore`] and are provided here.
pub trait Soundcard: Send {
    fn name(&self) -> &str;

    fn core(&self) -> &SoundcardCore;

    fn core_mut(&mut self) -> &mut SoundcardCore;

    /// Open the device and begin playback.
    fn start(&mut self) -> AudioResult<()>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Hand the current buffer to the device, then swap buffers.
    fn play(&mut self) -> AudioResult<()>;

    /// Prepare capture. Backends without input keep recording silence.
    fn record_init(&mut self) -> AudioResult<()> {
        self.core_mut().set_recording(true);
        Ok(())
    }

    /// Fill the input buffer with one buffer of captured audio.
    fn record(&mut self) -> AudioResult<()> {
        self.core_mut().input_mut().silence();
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.core().is_recording()
    }

    fn presets(&self) -> Presets {
        self.core().presets()
    }

    fn set_presets(&mut self, presets: Presets) -> AudioResult<()> {
        self.core_mut().set_presets(presets)
    }

    fn buffer(&self) -> &AudioBuffer {
        self.core().buffer()
    }

    fn buffer_mut(&mut self) -> &mut AudioBuffer {
        self.core_mut().buffer_mut()
    }

    fn prev_buffer(&self) -> &AudioBuffer {
        self.core().prev_buffer()
    }

    fn bpm(&self) -> f64 {
        self.core().transport().bpm()
    }

    fn set_bpm(&mut self, bpm: f64) {
        self.core_mut().set_bpm(bpm);
    }

    fn delay_factor(&self) -> f64 {
        self.core().transport().delay_factor()
    }

    fn set_delay_factor(&mut self, delay_factor: f64) {
        self.core_mut().set_delay_factor(delay_factor);
    }

    fn absolute_delay(&self) -> f64 {
        self.core().transport().absolute_delay()
    }

    fn delay(&self) -> f64 {
        self.core().transport().delay()
    }

    fn attack(&self) -> u32 {
        self.core().transport().attack()
    }

    fn note_offset(&self) -> u64 {
        self.core().transport().note_offset()
    }

    fn set_note_offset(&mut self, offset: u64) {
        self.core_mut().transport_mut().set_note_offset(offset);
    }

    fn set_loop(&mut self, left: u64, right: u64, do_loop: bool) {
        self.core_mut().transport_mut().set_loop(left, right, do_loop);
    }

    /// Advance the transport by one buffer. Returns `true` on a new step.
    fn tic(&mut self) -> bool {
        self.core_mut().transport_mut().tic()
    }
}

/// A soundcard shared between the engine threads.
pub type SharedSoundcard = Arc<Mutex<dyn Soundcard>>;

pub fn shared_soundcard(card: impl Soundcard + 'static) -> SharedSoundcard {
    Arc::new(Mutex::new(card))
}
