//! Sequencer (MIDI input) capability interface and the software backend.
//!
//! Device callbacks append raw MIDI bytes to an incoming buffer; each tick
//! [`Sequencer::record`] swaps it with the readable buffer, so readers see
//! exactly the bytes that arrived during the previous tick.

use std::sync::Arc;

use parking_lot::Mutex;
use tw_ir::Presets;

use crate::error::AudioResult;
use crate::transport::Transport;

/// State every sequencer backend carries.
#[derive(Debug)]
pub struct SequencerCore {
    presets: Presets,
    incoming: Arc<Mutex<Vec<u8>>>,
    buffer: Vec<u8>,
    transport: Transport,
}

impl SequencerCore {
    /// `presets` is the timing reference, normally the default soundcard's.
    pub fn new(presets: Presets) -> Self {
        Self {
            presets,
            incoming: Arc::new(Mutex::new(Vec::new())),
            buffer: Vec::new(),
            transport: Transport::new(&presets),
        }
    }

    /// Writer side for device callbacks.
    pub fn incoming(&self) -> Arc<Mutex<Vec<u8>>> {
        self.incoming.clone()
    }

    /// Bytes received during the last recorded tick.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn swap(&mut self) {
        let mut incoming = self.incoming.lock();
        std::mem::swap(&mut *incoming, &mut self.buffer);
        incoming.clear();
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    pub fn set_timing(&mut self, presets: Presets) {
        self.presets = presets;
        self.transport.refresh(&presets);
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        let delay_factor = self.transport.delay_factor();
        self.transport.set_tempo(&self.presets, bpm, delay_factor);
    }

    pub fn set_delay_factor(&mut self, delay_factor: f64) {
        let bpm = self.transport.bpm();
        self.transport.set_tempo(&self.presets, bpm, delay_factor);
    }
}

pub trait Sequencer: Send {
    fn name(&self) -> &str;

    fn core(&self) -> &SequencerCore;

    fn core_mut(&mut self) -> &mut SequencerCore;

    fn start(&mut self) -> AudioResult<()>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Make the bytes received since the last call readable.
    fn record(&mut self) -> AudioResult<()> {
        self.core_mut().swap();
        Ok(())
    }

    fn buffer(&self) -> &[u8] {
        self.core().buffer()
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

    fn note_offset(&self) -> u64 {
        self.core().transport().note_offset()
    }

    fn tic(&mut self) -> bool {
        self.core_mut().transport_mut().tic()
    }
}

pub type SharedSequencer = Arc<Mutex<dyn Sequencer>>;

pub fn shared_sequencer(sequencer: impl Sequencer + 'static) -> SharedSequencer {
    Arc::new(Mutex::new(sequencer))
}

/// Sequencer without a device. Bytes are injected by the caller.
pub struct NullSequencer {
    name: String,
    core: SequencerCore,
    running: bool,
}

impl NullSequencer {
    pub fn new(presets: Presets) -> Self {
        Self {
            name: "null-midi".into(),
            core: SequencerCore::new(presets),
            running: false,
        }
    }

    /// Handle that appends bytes as if a device had sent them.
    pub fn injector(&self) -> MidiInjector {
        MidiInjector(self.core.incoming())
    }
}

#[derive(Clone)]
pub struct MidiInjector(Arc<Mutex<Vec<u8>>>);

impl MidiInjector {
    pub fn send(&self, bytes: &[u8]) {
        self.0.lock().extend_from_slice(bytes);
    }
}

impl Sequencer for NullSequencer {
    fn name(&self) -> &str {
        &self.name
    }

    fn core(&self) -> &SequencerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SequencerCore {
        &mut self.core
    }

    fn start(&mut self) -> AudioResult<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_exposes_one_tick_of_bytes() {
        let mut seq = NullSequencer::new(Presets::default());
        let midi = seq.injector();
        seq.start().unwrap();

        midi.send(&[0x90, 60, 100]);
        assert!(seq.buffer().is_empty());
        seq.record().unwrap();
        assert_eq!(seq.buffer(), &[0x90, 60, 100]);

        midi.send(&[0x80, 60, 0]);
        seq.record().unwrap();
        assert_eq!(seq.buffer(), &[0x80, 60, 0]);

        seq.record().unwrap();
        assert!(seq.buffer().is_empty());
    }

    #[test]
    fn bpm_reaches_transport() {
        let mut seq = NullSequencer::new(Presets::default());
        seq.set_bpm(90.0);
        assert_eq!(seq.bpm(), 90.0);
        assert_eq!(seq.core().transport().bpm(), 90.0);
    }
}
