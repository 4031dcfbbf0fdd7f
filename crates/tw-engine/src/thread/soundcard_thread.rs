use log::{error, info, trace};
use tw_audio::SharedSoundcard;
use tw_thread::{ThreadError, ThreadResult, ThreadRun};

/// Plays a soundcard's buffer and advances its transport every tick.
///
/// Runs post-sync under the audio loop, so the buffer holds everything the
/// voices mixed this tick. A device error stops this thread and its export
/// children; the rest of the engine keeps running.
pub struct SoundcardThread {
    soundcard: SharedSoundcard,
    name: String,
}

impl SoundcardThread {
    pub fn new(soundcard: SharedSoundcard) -> Self {
        let name = soundcard.lock().name().to_string();
        Self { soundcard, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ThreadRun for SoundcardThread {
    fn start(&mut self) -> ThreadResult<()> {
        let mut card = self.soundcard.lock();
        if !card.is_running() {
            card.start().map_err(|e| ThreadError::backend(&self.name, e))?;
        }
        let presets = card.presets();
        info!(
            target: "soundcard",
            "{}: {} ch, {} Hz, {} frames",
            self.name, presets.pcm_channels, presets.samplerate, presets.buffer_size
        );
        Ok(())
    }

    fn run(&mut self, tick: u64) -> ThreadResult<()> {
        let mut card = self.soundcard.lock();
        if card.is_recording() {
            card.record().map_err(|e| {
                error!(target: "soundcard", "{}: record failed: {e}", self.name);
                ThreadError::backend(&self.name, e)
            })?;
        }
        card.play().map_err(|e| {
            error!(target: "soundcard", "{}: play failed: {e}", self.name);
            ThreadError::backend(&self.name, e)
        })?;
        if card.tic() {
            trace!(target: "soundcard", "{} step {} at tick {tick}", self.name, card.note_offset());
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.soundcard.lock().stop();
        info!(target: "soundcard", "{} stopped", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use tw_audio::{shared_soundcard, NullSoundcard};
    use tw_ir::Presets;

    #[test]
    fn plays_and_tics_each_run() {
        let mut card = NullSoundcard::new(Presets::default());
        let capture = card.capture(8);
        let shared = shared_soundcard(card);
        let mut thread = SoundcardThread::new(shared.clone());
        thread.start().unwrap();

        shared.lock().buffer_mut().channel_mut(0)[0] = 0.75;
        for tick in 1..=3 {
            thread.run(tick).unwrap();
        }
        assert_eq!(capture.len(), 3);
        assert_eq!(capture.peak(), 0.75);
        assert_eq!(shared.lock().core().played(), 3);
        assert_eq!(shared.lock().core().transport().delay_counter(), 3.0);

        thread.stop();
        assert!(!shared.lock().is_running());
    }

    #[test]
    fn device_loss_is_a_backend_error() {
        let card = NullSoundcard::new(Presets::default()).with_name("card");
        let fail = card.fail_switch();
        let mut thread = SoundcardThread::new(shared_soundcard(card));
        thread.start().unwrap();
        thread.run(1).unwrap();

        fail.store(true, Ordering::Release);
        match thread.run(2) {
            Err(ThreadError::Backend { name, .. }) => assert_eq!(name, "card"),
            other => panic!("expected backend error, got {other:?}"),
        }
    }
}
