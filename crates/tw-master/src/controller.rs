//! Headless controller: builds an engine from the configuration and
//! drives playback and export.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use log::{info, warn};
use tw_audio::{
    shared_sequencer, shared_soundcard, CpalSoundcard, MidirSequencer, NullSequencer, NullSoundcard, SharedSoundcard,
};
use tw_engine::{Audio, AudioKey, EngineContext, ExportHandle, GraphResult, Voice};
use tw_ir::SoundScope;

use crate::config::{Config, SequencerBackend, SoundcardBackend};
use crate::error::{ControllerError, ControllerResult};
use crate::settings::{PresetsSettings, TempoSettings};
use crate::wav::WavWriter;

/// Owns one engine for its whole life, from [`init`](Self::init) to
/// [`teardown`](Self::teardown).
pub struct Controller {
    config: Config,
    engine: Arc<EngineContext>,
}

impl Controller {
    /// Open the configured soundcard and sequencer and build the engine.
    /// Nothing runs until [`start`](Self::start).
    ///
    /// A cpal soundcard that cannot be opened falls back to the null
    /// backend with a warning.
    pub fn init(config: Config) -> ControllerResult<Self> {
        let soundcard = open_soundcard(&config)?;
        Self::with_soundcard(config, soundcard)
    }

    /// Like [`init`](Self::init) around a soundcard the caller built.
    pub fn with_soundcard(config: Config, soundcard: SharedSoundcard) -> ControllerResult<Self> {
        let presets = config.presets()?;
        let engine = EngineContext::init(config.engine()?, soundcard)?;
        match config.sequencer_backend()? {
            SequencerBackend::None => {}
            SequencerBackend::Null => {
                engine.add_sequencer(shared_sequencer(NullSequencer::new(presets)));
            }
            SequencerBackend::Midir => {
                let port = config.sequencer_port().map(str::to_string);
                engine.add_sequencer(shared_sequencer(MidirSequencer::new(port, presets)));
            }
        }
        if let Some(source) = config.source() {
            info!(target: "config", "configured from {}", source.display());
        }
        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<EngineContext> {
        &self.engine
    }

    // --- Run ---

    pub fn start(&self) -> ControllerResult<()> {
        self.engine.start()?;
        Ok(())
    }

    /// Start without a main loop thread; tick with [`step`](Self::step).
    pub fn start_stepped(&self) -> ControllerResult<()> {
        self.engine.start_stepped()?;
        Ok(())
    }

    pub fn step(&self) -> ControllerResult<bool> {
        Ok(self.engine.step()?)
    }

    /// Block until every export finished, the tree stopped or `limit`
    /// passed. Returns whether every export finished.
    pub fn wait(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let exports = self.engine.exports();
            let done = !exports.is_empty() && exports.iter().all(ExportHandle::is_finished);
            if done {
                return true;
            }
            if !self.engine.tree().root().is_running() || Instant::now() >= deadline {
                return exports.iter().all(ExportHandle::is_finished);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Stop every thread, cancel every voice and finalize exports.
    pub fn teardown(&self) {
        self.engine.teardown();
    }

    // --- Graph ---

    /// Register `audio` with the engine's devices.
    pub fn add_audio(&self, audio: Arc<Audio>) -> Receiver<AudioKey> {
        self.engine.add_audio(audio)
    }

    /// Start the sequencer on every output of `audio`.
    pub fn play(&self, audio: &Arc<Audio>) -> Receiver<GraphResult<Vec<Arc<Voice>>>> {
        self.engine.play_audio(audio, SoundScope::Sequencer)
    }

    pub fn stop(&self, audio: &Arc<Audio>) {
        self.engine.stop_audio(audio, SoundScope::Sequencer);
    }

    // --- Export ---

    /// Write what the default soundcard plays to `path`, for `seconds`
    /// or until teardown.
    pub fn export_wav(&self, path: &Path, seconds: Option<f64>) -> ControllerResult<ExportHandle> {
        let presets = self
            .engine
            .soundcard()
            .map(|card| card.lock().presets())
            .ok_or(ControllerError::NoSoundcard)?;
        let writer = WavWriter::create(path, &presets)?;
        let budget = seconds.map(|s| (s.max(0.0) / presets.buffer_seconds()).ceil() as u64);
        info!(
            target: "export",
            "exporting to {}{}",
            path.display(),
            budget.map(|b| format!(" ({b} buffers)")).unwrap_or_default()
        );
        Ok(self.engine.add_export(Box::new(writer), budget)?)
    }

    // --- Settings ---

    pub fn presets_settings(&self) -> PresetsSettings {
        PresetsSettings::new(self.engine.clone())
    }

    pub fn tempo_settings(&self) -> TempoSettings {
        TempoSettings::new(self.engine.clone())
    }
}

fn open_soundcard(config: &Config) -> ControllerResult<SharedSoundcard> {
    let presets = config.presets()?;
    let card = match config.soundcard_backend()? {
        SoundcardBackend::Null => shared_soundcard(NullSoundcard::new(presets)),
        SoundcardBackend::Cpal => match CpalSoundcard::new(config.cpal_host()?, presets) {
            Ok(card) => shared_soundcard(card),
            Err(e) => {
                warn!(target: "soundcard", "cpal soundcard unavailable ({e}), using the null backend");
                shared_soundcard(NullSoundcard::new(presets))
            }
        },
    };
    Ok(card)
}
