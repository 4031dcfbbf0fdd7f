//! Software soundcard without hardware.
//!
//! Used for offline rendering and tests. Played buffers can be captured
//! (bounded), and a fail switch emulates device loss.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tw_ir::{AudioBuffer, Presets};

use crate::error::{AudioError, AudioResult};
use crate::soundcard::{Soundcard, SoundcardCore};

/// Handle to the buffers a [`NullSoundcard`] has played.
#[derive(Clone, Default)]
pub struct Capture {
    buffers: Arc<Mutex<Vec<AudioBuffer>>>,
}

impl Capture {
    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.lock().is_empty()
    }

    pub fn take(&self) -> Vec<AudioBuffer> {
        std::mem::take(&mut *self.buffers.lock())
    }

    /// Peak over everything captured so far.
    pub fn peak(&self) -> f32 {
        self.buffers.lock().iter().map(AudioBuffer::peak).fold(0.0, f32::max)
    }
}

pub struct NullSoundcard {
    name: String,
    core: SoundcardCore,
    running: bool,
    capture: Option<(Capture, usize)>,
    fail: Arc<AtomicBool>,
}

impl NullSoundcard {
    pub fn new(presets: Presets) -> Self {
        Self {
            name: "null".into(),
            core: SoundcardCore::new(presets),
            running: false,
            capture: None,
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Keep copies of up to `max_buffers` played buffers.
    pub fn capture(&mut self, max_buffers: usize) -> Capture {
        let capture = Capture::default();
        self.capture = Some((capture.clone(), max_buffers));
        capture
    }

    /// Setting the returned flag makes the next `play()` fail.
    pub fn fail_switch(&self) -> Arc<AtomicBool> {
        self.fail.clone()
    }
}

impl Soundcard for NullSoundcard {
    fn name(&self) -> &str {
        &self.name
    }

    fn core(&self) -> &SoundcardCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SoundcardCore {
        &mut self.core
    }

    fn start(&mut self) -> AudioResult<()> {
        self.fail.store(false, Ordering::Release);
        self.running = true;
        log::debug!(target: "soundcard", "{} started", self.name);
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn play(&mut self) -> AudioResult<()> {
        if self.fail.load(Ordering::Acquire) {
            self.running = false;
            return Err(AudioError::Stream(format!("{}: device lost", self.name)));
        }
        if let Some((capture, max)) = &self.capture {
            let mut buffers = capture.buffers.lock();
            if buffers.len() < *max {
                buffers.push(self.core.buffer().clone());
            }
        }
        self.core.swap_buffers();
        Ok(())
    }
}
