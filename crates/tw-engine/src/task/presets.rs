use std::sync::Arc;

use log::{info, warn};
use tw_audio::SharedSoundcard;
use tw_ir::Presets;
use tw_thread::{Task, Thread};

use super::{send, Reply};
use crate::audio::Audio;
use crate::error::{EngineError, EngineResult};

/// Change a soundcard's presets and carry them to every audio it feeds.
///
/// The soundcard is updated first; if it refuses the presets nothing else
/// changes. Threads given with [`retune`](Self::retune) follow the new
/// buffer rate.
pub struct ApplyPresets {
    soundcard: Option<SharedSoundcard>,
    audios: Vec<Arc<Audio>>,
    presets: Presets,
    threads: Vec<Arc<Thread>>,
    overclock: f64,
    reply: Reply<EngineResult<()>>,
}

impl ApplyPresets {
    pub fn new(soundcard: Option<SharedSoundcard>, audios: Vec<Arc<Audio>>, presets: Presets) -> Self {
        Self {
            soundcard,
            audios,
            presets,
            threads: Vec::new(),
            overclock: 0.0,
            reply: None,
        }
    }

    pub fn retune(mut self, threads: Vec<Arc<Thread>>, overclock: f64) -> Self {
        self.threads = threads;
        self.overclock = overclock;
        self
    }

    pub fn with_reply(mut self, reply: crossbeam_channel::Sender<EngineResult<()>>) -> Self {
        self.reply = Some(reply);
        self
    }
}

impl Task for ApplyPresets {
    fn name(&self) -> &str {
        "apply-presets"
    }

    fn launch(&mut self) {
        if let Some(card) = &self.soundcard {
            if let Err(e) = card.lock().set_presets(self.presets) {
                warn!(target: "task", "apply-presets refused: {e}");
                send(&self.reply, Err(EngineError::Audio(e)));
                return;
            }
        }
        for audio in &self.audios {
            audio.apply_presets(&self.presets);
        }
        let frequency = self.presets.frequency(self.overclock);
        for thread in &self.threads {
            thread.set_frequency(frequency);
        }
        info!(
            target: "task",
            "presets {} ch, {} Hz, {} frames, {:?} on {} audios",
            self.presets.pcm_channels,
            self.presets.samplerate,
            self.presets.buffer_size,
            self.presets.format,
            self.audios.len()
        );
        send(&self.reply, Ok(()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::flags;
    use crate::channel::Direction;
    use crate::signal::AudioSignal;
    use tw_audio::{shared_soundcard, NullSoundcard};
    use tw_ir::SampleFormat;

    #[test]
    fn presets_reach_audio_channels_and_signals() {
        let card = shared_soundcard(NullSoundcard::new(Presets::default()));
        let audio = Audio::new("a", flags::OUTPUT_HAS_RECYCLING, &Presets::default());
        audio.resize(1, 1, 1).unwrap();
        let recycling = audio.channel(Direction::Output, 0).unwrap().own_recycling().unwrap();
        let voice = Arc::new(AudioSignal::new(&Presets::default(), Some(7)));
        recycling.add_signal(voice.clone());

        let presets = Presets::new(2, 48_000, 256, SampleFormat::Float);
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut task = ApplyPresets::new(Some(card.clone()), vec![audio.clone()], presets).with_reply(tx);
        task.launch();

        assert!(rx.recv().unwrap().is_ok());
        assert_eq!(card.lock().presets(), presets);
        assert_eq!(audio.presets(), presets);
        assert_eq!(audio.channel(Direction::Input, 0).unwrap().presets(), presets);
        voice.with(|s| {
            assert_eq!(s.samplerate, 48_000);
            assert_eq!(s.buffer_size, 256);
        });
    }

    #[test]
    fn refused_presets_change_nothing() {
        let card = shared_soundcard(NullSoundcard::new(Presets::default()));
        let audio = Audio::new("a", 0, &Presets::default());
        let bad = Presets::new(0, 44_100, 512, SampleFormat::S16);
        let (tx, rx) = crossbeam_channel::unbounded();
        ApplyPresets::new(Some(card), vec![audio.clone()], bad).with_reply(tx).launch();

        assert!(matches!(rx.recv().unwrap(), Err(EngineError::Audio(_))));
        assert_eq!(audio.presets(), Presets::default());
    }
}
