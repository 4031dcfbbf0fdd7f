//! Editable settings models that push their values into a running engine.

use std::sync::Arc;

use crossbeam_channel::{Receiver, TryRecvError};
use log::info;
use tw_engine::task::BpmReport;
use tw_engine::{EngineContext, EngineResult};
use tw_ir::{Presets, SampleFormat, DEFAULT_BPM};

use crate::error::{ControllerError, ControllerResult};

/// A model edited by a front end and applied to the engine on demand.
pub trait Applicable {
    /// With update on, every change is applied at once.
    fn set_update(&mut self, update: bool);

    /// Queue the current values as engine tasks.
    fn apply(&mut self) -> ControllerResult<()>;

    /// Reload the values from the engine, dropping unapplied edits.
    fn reset(&mut self);
}

fn poll<T>(pending: &mut Option<Receiver<T>>, task: &'static str) -> Option<ControllerResult<T>> {
    let rx = pending.as_ref()?;
    match rx.try_recv() {
        Ok(value) => {
            *pending = None;
            Some(Ok(value))
        }
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Disconnected) => {
            *pending = None;
            Some(Err(ControllerError::TaskDropped(task)))
        }
    }
}

/// Soundcard presets: channels, sample rate, buffer size and format.
pub struct PresetsSettings {
    engine: Arc<EngineContext>,
    presets: Presets,
    update: bool,
    pending: Option<Receiver<EngineResult<()>>>,
}

impl PresetsSettings {
    pub fn new(engine: Arc<EngineContext>) -> Self {
        let mut settings = Self {
            engine,
            presets: Presets::default(),
            update: false,
            pending: None,
        };
        settings.reset();
        settings
    }

    pub fn presets(&self) -> Presets {
        self.presets
    }

    pub fn set_pcm_channels(&mut self, pcm_channels: u16) -> ControllerResult<()> {
        self.presets.pcm_channels = pcm_channels;
        self.changed()
    }

    pub fn set_samplerate(&mut self, samplerate: u32) -> ControllerResult<()> {
        self.presets.samplerate = samplerate;
        self.changed()
    }

    pub fn set_buffer_size(&mut self, buffer_size: u32) -> ControllerResult<()> {
        self.presets.buffer_size = buffer_size;
        self.changed()
    }

    pub fn set_format(&mut self, format: SampleFormat) -> ControllerResult<()> {
        self.presets.format = format;
        self.changed()
    }

    /// Outcome of the last apply, once the engine ran it.
    pub fn applied(&mut self) -> Option<ControllerResult<()>> {
        poll(&mut self.pending, "apply-presets").map(|r| r.and_then(|inner| inner.map_err(ControllerError::from)))
    }

    fn changed(&mut self) -> ControllerResult<()> {
        if self.update {
            self.apply()
        } else {
            Ok(())
        }
    }
}

impl Applicable for PresetsSettings {
    fn set_update(&mut self, update: bool) {
        self.update = update;
    }

    fn apply(&mut self) -> ControllerResult<()> {
        if !self.presets.is_valid() {
            return Err(ControllerError::InvalidSetting {
                name: "presets",
                value: format!("{:?}", self.presets),
            });
        }
        info!(
            target: "config",
            "applying presets: {} channels, {} Hz, {} frames, {:?}",
            self.presets.pcm_channels,
            self.presets.samplerate,
            self.presets.buffer_size,
            self.presets.format
        );
        self.pending = Some(self.engine.apply_presets(self.presets));
        Ok(())
    }

    fn reset(&mut self) {
        self.presets = self
            .engine
            .soundcard()
            .map(|card| card.lock().presets())
            .unwrap_or_default();
        self.pending = None;
    }
}

/// Tempo of every soundcard, sequencer and audio.
pub struct TempoSettings {
    engine: Arc<EngineContext>,
    bpm: f64,
    update: bool,
    pending: Option<Receiver<BpmReport>>,
}

impl TempoSettings {
    pub const MAX_BPM: f64 = 999.0;

    pub fn new(engine: Arc<EngineContext>) -> Self {
        let mut settings = Self {
            engine,
            bpm: DEFAULT_BPM,
            update: false,
            pending: None,
        };
        settings.reset();
        settings
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) -> ControllerResult<()> {
        self.bpm = bpm;
        if self.update {
            self.apply()
        } else {
            Ok(())
        }
    }

    /// What the last apply reached, once the engine ran it.
    pub fn applied(&mut self) -> Option<ControllerResult<BpmReport>> {
        poll(&mut self.pending, "apply-bpm")
    }
}

impl Applicable for TempoSettings {
    fn set_update(&mut self, update: bool) {
        self.update = update;
    }

    fn apply(&mut self) -> ControllerResult<()> {
        if !(self.bpm.is_finite() && self.bpm > 0.0 && self.bpm <= Self::MAX_BPM) {
            return Err(ControllerError::InvalidSetting {
                name: "bpm",
                value: self.bpm.to_string(),
            });
        }
        info!(target: "config", "applying tempo {} bpm", self.bpm);
        self.pending = Some(self.engine.apply_bpm(self.bpm));
        Ok(())
    }

    fn reset(&mut self) {
        self.bpm = self
            .engine
            .soundcard()
            .map(|card| card.lock().bpm())
            .unwrap_or(self.engine.config().bpm);
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_audio::{shared_soundcard, NullSoundcard};
    use tw_engine::{EngineConfig, TaskMode};
    use tw_thread::{TreeConfig, TreeMode};

    fn engine() -> Arc<EngineContext> {
        let config = EngineConfig {
            tree: TreeConfig {
                mode: TreeMode::SingleThreaded,
                ..TreeConfig::default()
            },
            task_mode: TaskMode::Inline,
            bpm: 100.0,
            ..EngineConfig::default()
        };
        let engine = EngineContext::init(config, shared_soundcard(NullSoundcard::new(Presets::default()))).unwrap();
        engine.start_stepped().unwrap();
        Arc::new(engine)
    }

    #[test]
    fn presets_apply_on_demand() {
        let engine = engine();
        let mut settings = PresetsSettings::new(engine.clone());
        assert_eq!(settings.presets(), Presets::default());

        settings.set_samplerate(48_000).unwrap();
        settings.set_buffer_size(256).unwrap();
        assert!(settings.applied().is_none());
        engine.step().unwrap();
        assert_eq!(engine.soundcard().unwrap().lock().presets().samplerate, 44_100);

        settings.apply().unwrap();
        engine.step().unwrap();
        assert!(matches!(settings.applied(), Some(Ok(()))));
        let card = engine.soundcard().unwrap().lock().presets();
        assert_eq!((card.samplerate, card.buffer_size), (48_000, 256));
        engine.teardown();
    }

    #[test]
    fn update_mode_applies_every_change() {
        let engine = engine();
        let mut settings = PresetsSettings::new(engine.clone());
        settings.set_update(true);
        settings.set_format(SampleFormat::Float).unwrap();
        engine.step().unwrap();
        assert!(matches!(settings.applied(), Some(Ok(()))));
        assert_eq!(engine.soundcard().unwrap().lock().presets().format, SampleFormat::Float);
        engine.teardown();
    }

    #[test]
    fn reset_drops_edits_and_invalid_values_are_refused() {
        let engine = engine();
        let mut settings = PresetsSettings::new(engine.clone());
        settings.set_buffer_size(0).unwrap();
        assert!(matches!(
            settings.apply(),
            Err(ControllerError::InvalidSetting { name: "presets", .. })
        ));
        settings.reset();
        assert_eq!(settings.presets(), Presets::default());
        engine.teardown();
    }

    #[test]
    fn tempo_reaches_devices() {
        let engine = engine();
        let mut tempo = TempoSettings::new(engine.clone());
        assert_eq!(tempo.bpm(), 100.0);

        tempo.set_bpm(1200.0).unwrap();
        assert!(tempo.apply().is_err());

        tempo.set_update(true);
        tempo.set_bpm(140.0).unwrap();
        engine.step().unwrap();
        let report = tempo.applied().unwrap().unwrap();
        assert_eq!(report.soundcards, 1);
        assert_eq!(engine.soundcard().unwrap().lock().bpm(), 140.0);

        tempo.set_bpm(90.0).unwrap();
        tempo.reset();
        assert_eq!(tempo.bpm(), 140.0);
        engine.teardown();
    }
}
