use std::sync::Arc;

use log::info;
use tw_audio::{SharedSequencer, SharedSoundcard};
use tw_thread::Task;

use super::{send, Reply};
use crate::audio::Audio;

/// What an [`ApplyBpm`] reached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BpmReport {
    pub audios: usize,
    pub recalls: usize,
    pub soundcards: usize,
    pub sequencers: usize,
}

/// Set the tempo on audios, their tempo-aware recalls and the devices.
pub struct ApplyBpm {
    bpm: f64,
    audios: Vec<Arc<Audio>>,
    soundcards: Vec<SharedSoundcard>,
    sequencers: Vec<SharedSequencer>,
    reply: Reply<BpmReport>,
}

impl ApplyBpm {
    pub fn new(bpm: f64, audios: Vec<Arc<Audio>>) -> Self {
        Self {
            bpm,
            audios,
            soundcards: Vec::new(),
            sequencers: Vec::new(),
            reply: None,
        }
    }

    pub fn with_devices(mut self, soundcards: Vec<SharedSoundcard>, sequencers: Vec<SharedSequencer>) -> Self {
        self.soundcards = soundcards;
        self.sequencers = sequencers;
        self
    }

    pub fn with_reply(mut self, reply: crossbeam_channel::Sender<BpmReport>) -> Self {
        self.reply = Some(reply);
        self
    }
}

impl Task for ApplyBpm {
    fn name(&self) -> &str {
        "apply-bpm"
    }

    fn launch(&mut self) {
        let mut report = BpmReport::default();
        for audio in &self.audios {
            audio.set_bpm(self.bpm);
            report.audios += 1;
            for recall in audio.all_recalls() {
                if recall.set_bpm(self.bpm) {
                    report.recalls += 1;
                }
            }
        }
        for card in &self.soundcards {
            card.lock().set_bpm(self.bpm);
            report.soundcards += 1;
        }
        for sequencer in &self.sequencers {
            sequencer.lock().set_bpm(self.bpm);
            report.sequencers += 1;
        }
        info!(target: "task", "bpm {} reached {:?}", self.bpm, report);
        send(&self.reply, report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::flags;
    use crate::recall::{RecallFactory, RecallList, Target};
    use tw_audio::{shared_sequencer, shared_soundcard, NullSequencer, NullSoundcard};
    use tw_ir::{PortValue, Presets};

    #[test]
    fn reaches_audios_recalls_and_devices() {
        let presets = Presets::default();
        let audio = Audio::new("drum", flags::INPUT_HAS_RECYCLING | flags::OUTPUT_HAS_RECYCLING, &presets);
        audio.resize(1, 1, 2).unwrap();
        for effect in ["delay", "count-beats"] {
            RecallFactory::create(&audio, effect, Target::outputs(&audio), RecallFactory::PLAY).unwrap();
        }
        RecallFactory::create(&audio, "pattern", Target::inputs(&audio), RecallFactory::PLAY).unwrap();
        let card = shared_soundcard(NullSoundcard::new(presets));
        let sequencer = shared_sequencer(NullSequencer::new(presets));

        let (tx, rx) = crossbeam_channel::unbounded();
        ApplyBpm::new(140.0, vec![audio.clone()])
            .with_devices(vec![card.clone()], vec![sequencer.clone()])
            .with_reply(tx)
            .launch();

        let report = rx.recv().unwrap();
        // only the delay template keeps a tempo
        assert_eq!(report, BpmReport { audios: 1, recalls: 1, soundcards: 1, sequencers: 1 });
        assert_eq!(audio.bpm(), 140.0);
        assert_eq!(card.lock().bpm(), 140.0);
        assert_eq!(sequencer.lock().bpm(), 140.0);

        let delay = audio.find_container("delay", RecallList::Play).unwrap();
        assert_eq!(delay.port_value("bpm"), Some(PortValue::Float(140.0)));
        let tempo_aware: Vec<_> = audio
            .all_recalls()
            .into_iter()
            .filter(|r| r.is_tempo_aware())
            .map(|r| r.effect().to_string())
            .collect();
        assert_eq!(tempo_aware, vec!["delay".to_string()]);
    }
}
