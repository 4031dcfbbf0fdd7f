use std::sync::Arc;

use log::{debug, warn};
use tw_ir::{buffer_util, Presets};
use tw_thread::Task;

use crate::recycling::Recycling;
use crate::signal::AudioSignal;

/// Put a signal into a recycling.
pub struct AddAudioSignal {
    recycling: Arc<Recycling>,
    signal: Arc<AudioSignal>,
}

impl AddAudioSignal {
    pub fn new(recycling: Arc<Recycling>, signal: Arc<AudioSignal>) -> Self {
        Self { recycling, signal }
    }
}

impl Task for AddAudioSignal {
    fn name(&self) -> &str {
        "add-audio-signal"
    }

    fn launch(&mut self) {
        self.signal.apply_presets(&self.recycling.presets());
        self.recycling.add_signal(self.signal.clone());
        debug!(target: "task", "signal {} added to recycling {}", self.signal.id(), self.recycling.id());
    }
}

pub struct RemoveAudioSignal {
    recycling: Arc<Recycling>,
    signal_id: u64,
}

impl RemoveAudioSignal {
    pub fn new(recycling: Arc<Recycling>, signal_id: u64) -> Self {
        Self { recycling, signal_id }
    }
}

impl Task for RemoveAudioSignal {
    fn name(&self) -> &str {
        "remove-audio-signal"
    }

    fn launch(&mut self) {
        if !self.recycling.remove_signal(self.signal_id) {
            warn!(target: "task", "signal {} not in recycling {}", self.signal_id, self.recycling.id());
        }
    }
}

/// Replace a recycling's template with `samples` recorded at `samplerate`.
///
/// Samples are resampled to the recycling's rate first.
pub struct SetTemplate {
    recycling: Arc<Recycling>,
    samples: Vec<f32>,
    samplerate: u32,
}

impl SetTemplate {
    pub fn new(recycling: Arc<Recycling>, samples: Vec<f32>, samplerate: u32) -> Self {
        Self {
            recycling,
            samples,
            samplerate,
        }
    }
}

impl Task for SetTemplate {
    fn name(&self) -> &str {
        "set-template"
    }

    fn launch(&mut self) {
        let presets: Presets = self.recycling.presets();
        let samples = if self.samplerate == 0 || self.samplerate == presets.samplerate {
            std::mem::take(&mut self.samples)
        } else {
            buffer_util::resample(&self.samples, self.samplerate, presets.samplerate)
        };
        let template = AudioSignal::template_from_samples(&presets, &samples);
        debug!(
            target: "task",
            "template of recycling {}: {} frames in {} buffers",
            self.recycling.id(),
            samples.len(),
            template.len()
        );
        self.recycling.set_template(Arc::new(template));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_ir::SampleFormat;

    #[test]
    fn template_is_resampled_to_the_recycling() {
        let presets = Presets::new(1, 44_100, 441, SampleFormat::S16);
        let recycling = Recycling::new(&presets);
        SetTemplate::new(recycling.clone(), vec![0.5; 22_050], 22_050).launch();

        let template = recycling.template().unwrap();
        let frames = template.with(|s| s.sample_count());
        assert!((44_000..=44_200).contains(&frames), "{frames}");
        assert_eq!(template.len(), 100);
        assert_eq!(recycling.signals().len(), 1);
    }

    #[test]
    fn add_and_remove_signal() {
        let recycling = Recycling::new(&Presets::default());
        let signal = Arc::new(AudioSignal::new(&Presets::default(), Some(3)));
        AddAudioSignal::new(recycling.clone(), signal.clone()).launch();
        assert!(recycling.has_live_signals());

        RemoveAudioSignal::new(recycling.clone(), signal.id()).launch();
        assert!(!recycling.has_live_signals());
        RemoveAudioSignal::new(recycling.clone(), signal.id()).launch();
        assert_eq!(recycling.signals().len(), 1);
    }
}
