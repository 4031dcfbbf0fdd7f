use log::{error, info, trace};
use tw_audio::SharedSequencer;
use tw_thread::{ThreadError, ThreadResult, ThreadRun};

/// Parent of the sequencer threads. Does no work of its own.
#[derive(Default)]
pub struct MidiLoop;

impl ThreadRun for MidiLoop {
    fn run(&mut self, _tick: u64) -> ThreadResult<()> {
        Ok(())
    }
}

/// Makes a sequencer's received bytes readable and advances its transport
/// every tick.
pub struct SequencerThread {
    sequencer: SharedSequencer,
    name: String,
}

impl SequencerThread {
    pub fn new(sequencer: SharedSequencer) -> Self {
        let name = sequencer.lock().name().to_string();
        Self { sequencer, name }
    }
}

impl ThreadRun for SequencerThread {
    fn start(&mut self) -> ThreadResult<()> {
        let mut sequencer = self.sequencer.lock();
        if !sequencer.is_running() {
            sequencer.start().map_err(|e| ThreadError::backend(&self.name, e))?;
        }
        info!(target: "sequencer", "{} started", self.name);
        Ok(())
    }

    fn run(&mut self, _tick: u64) -> ThreadResult<()> {
        let mut sequencer = self.sequencer.lock();
        sequencer.record().map_err(|e| {
            error!(target: "sequencer", "{}: record failed: {e}", self.name);
            ThreadError::backend(&self.name, e)
        })?;
        let received = sequencer.buffer().len();
        if received > 0 {
            trace!(target: "sequencer", "{}: {received} bytes", self.name);
        }
        sequencer.tic();
        Ok(())
    }

    fn stop(&mut self) {
        self.sequencer.lock().stop();
        info!(target: "sequencer", "{} stopped", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_audio::{shared_sequencer, NullSequencer};
    use tw_ir::Presets;

    #[test]
    fn received_bytes_show_up_after_a_tick() {
        let sequencer = NullSequencer::new(Presets::default());
        let injector = sequencer.injector();
        let shared = shared_sequencer(sequencer);
        let mut thread = SequencerThread::new(shared.clone());
        thread.start().unwrap();

        injector.send(&[0x90, 60, 100]);
        assert!(shared.lock().buffer().is_empty());
        thread.run(1).unwrap();
        assert_eq!(shared.lock().buffer(), &[0x90, 60, 100]);
        thread.run(2).unwrap();
        assert!(shared.lock().buffer().is_empty());

        thread.stop();
        assert!(!shared.lock().is_running());
    }
}
