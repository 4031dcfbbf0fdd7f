use std::sync::Arc;

use log::{info, warn};
use tw_audio::{SharedSequencer, SharedSoundcard};
use tw_ir::SoundScope;
use tw_thread::Task;

use super::{send, Reply};
use crate::audio::Audio;
use crate::link;
use crate::registry::{AudioKey, AudioRegistry};
use crate::thread::AudioLoop;

/// Register an audio with the engine and attach it to its devices.
///
/// An audio attached to a soundcard takes the soundcard's presets.
pub struct AddAudio {
    registry: Arc<AudioRegistry>,
    audio: Arc<Audio>,
    soundcard: Option<SharedSoundcard>,
    sequencer: Option<SharedSequencer>,
    reply: Reply<AudioKey>,
}

impl AddAudio {
    pub fn new(registry: Arc<AudioRegistry>, audio: Arc<Audio>) -> Self {
        Self {
            registry,
            audio,
            soundcard: None,
            sequencer: None,
            reply: None,
        }
    }

    pub fn soundcard(mut self, soundcard: SharedSoundcard) -> Self {
        self.soundcard = Some(soundcard);
        self
    }

    pub fn sequencer(mut self, sequencer: SharedSequencer) -> Self {
        self.sequencer = Some(sequencer);
        self
    }

    pub fn with_reply(mut self, reply: crossbeam_channel::Sender<AudioKey>) -> Self {
        self.reply = Some(reply);
        self
    }
}

impl Task for AddAudio {
    fn name(&self) -> &str {
        "add-audio"
    }

    fn launch(&mut self) {
        if let Some(key) = self.registry.key_of(&self.audio) {
            send(&self.reply, key);
            return;
        }
        if let Some(card) = &self.soundcard {
            let (presets, bpm) = {
                let card = card.lock();
                (card.presets(), card.bpm())
            };
            self.audio.apply_presets(&presets);
            self.audio.set_bpm(bpm);
            self.audio.set_soundcard(Some(card.clone()));
        }
        if self.sequencer.is_some() {
            self.audio.set_sequencer(self.sequencer.clone());
        }
        let key = self.registry.insert(self.audio.clone());
        info!(target: "task", "added audio {}", self.audio.name());
        send(&self.reply, key);
    }
}

/// Stop, unlink and forget an audio.
pub struct RemoveAudio {
    registry: Arc<AudioRegistry>,
    key: AudioKey,
    audio_loop: Arc<AudioLoop>,
    reply: Reply<Option<Arc<Audio>>>,
}

impl RemoveAudio {
    pub fn new(registry: Arc<AudioRegistry>, key: AudioKey, audio_loop: Arc<AudioLoop>) -> Self {
        Self {
            registry,
            key,
            audio_loop,
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: crossbeam_channel::Sender<Option<Arc<Audio>>>) -> Self {
        self.reply = Some(reply);
        self
    }
}

impl Task for RemoveAudio {
    fn name(&self) -> &str {
        "remove-audio"
    }

    fn launch(&mut self) {
        let Some(audio) = self.registry.remove(self.key) else {
            warn!(target: "task", "remove-audio: unknown key {:?}", self.key);
            send(&self.reply, None);
            return;
        };
        for output in audio.outputs() {
            for scope in SoundScope::ALL {
                if let Some(voice) = self.audio_loop.find_voice(output.id(), scope) {
                    voice.cancel();
                    self.audio_loop.remove_voice(&voice);
                }
                if let Some(thread) = output.playback().thread(scope) {
                    thread.request_stop();
                }
            }
        }
        self.audio_loop.remove_domain(audio.id());
        for channel in audio.outputs().into_iter().chain(audio.inputs()) {
            if channel.is_linked() {
                // Only fails when the link vanished in between.
                let _ = link::unlink(&channel);
            }
        }
        audio.set_soundcard(None);
        audio.set_sequencer(None);
        info!(target: "task", "removed audio {}", audio.name());
        send(&self.reply, Some(audio));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::flags;
    use crate::channel::Direction;
    use tw_audio::{shared_soundcard, NullSoundcard};
    use tw_ir::{Presets, SampleFormat};

    #[test]
    fn added_audio_takes_soundcard_presets() {
        let registry = AudioRegistry::new();
        let presets = Presets::new(2, 48_000, 128, SampleFormat::S24);
        let card = shared_soundcard(NullSoundcard::new(presets));
        let audio = Audio::new("a", flags::OUTPUT_HAS_RECYCLING, &Presets::default());
        audio.resize(1, 1, 0).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        AddAudio::new(registry.clone(), audio.clone())
            .soundcard(card)
            .with_reply(tx.clone())
            .launch();
        let key = rx.recv().unwrap();
        assert_eq!(audio.presets(), presets);
        assert_eq!(audio.channel(Direction::Output, 0).unwrap().presets(), presets);
        assert!(audio.soundcard().is_some());

        AddAudio::new(registry.clone(), audio).with_reply(tx).launch();
        assert_eq!(rx.recv().unwrap(), key);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn removed_audio_is_unlinked() {
        let registry = AudioRegistry::new();
        let a = Audio::new("a", 0, &Presets::default());
        let b = Audio::new("b", 0, &Presets::default());
        a.resize(1, 1, 0).unwrap();
        b.resize(1, 0, 1).unwrap();
        let key = registry.insert(a.clone());
        registry.insert(b.clone());
        let b_in = b.channel(Direction::Input, 0).unwrap();
        link::link(&a.channel(Direction::Output, 0).unwrap(), &b_in).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        RemoveAudio::new(registry.clone(), key, AudioLoop::new(false))
            .with_reply(tx.clone())
            .launch();
        assert_eq!(rx.recv().unwrap().map(|a| a.name().to_string()), Some("a".into()));
        assert!(!b_in.is_linked());
        assert_eq!(registry.len(), 1);

        RemoveAudio::new(registry, key, AudioLoop::new(false)).with_reply(tx).launch();
        assert!(rx.recv().unwrap().is_none());
    }
}
