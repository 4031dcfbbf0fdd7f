//! Layered TOML configuration.
//!
//! The embedded `config.toml` holds every default. A user file, either the
//! one given on the command line or `<config dir>/tickwork/config.toml`,
//! overrides single fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;
use tw_audio::CpalHost;
use tw_engine::{EngineConfig, TaskMode};
use tw_ir::{Presets, SampleFormat};
use tw_thread::{TreeConfig, TreeMode};

use crate::error::{ConfigError, ConfigResult};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    thread: ThreadConfig,
    #[serde(default)]
    soundcard: SoundcardConfig,
    #[serde(default)]
    sequencer: SequencerConfig,
    #[serde(default)]
    engine: EngineSection,
}

#[derive(Deserialize, Default, Debug, Clone)]
struct ThreadConfig {
    mode: Option<String>,
    max_precision: Option<f64>,
    start_timeout_ms: Option<u64>,
    overclock: Option<f64>,
}

#[derive(Deserialize, Default, Debug, Clone)]
struct SoundcardConfig {
    backend: Option<String>,
    host: Option<String>,
    pcm_channels: Option<u16>,
    samplerate: Option<u32>,
    buffer_size: Option<u32>,
    format: Option<String>,
}

#[derive(Deserialize, Default, Debug, Clone)]
struct SequencerConfig {
    backend: Option<String>,
    port: Option<String>,
}

#[derive(Deserialize, Default, Debug, Clone)]
struct EngineSection {
    bpm: Option<f64>,
    delay_factor: Option<f64>,
    super_threaded_channels: Option<bool>,
    task_queue: Option<String>,
}

/// Soundcard backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SoundcardBackend {
    /// Software device without hardware.
    #[default]
    Null,
    Cpal,
}

/// Sequencer backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SequencerBackend {
    #[default]
    None,
    Null,
    Midir,
}

/// Merged configuration.
#[derive(Debug, Clone)]
pub struct Config {
    file: ConfigFile,
    source: Option<PathBuf>,
}

impl Config {
    /// Defaults merged with the user file at `path`, or at the default
    /// location when `path` is `None`.
    ///
    /// An explicit path that cannot be read is an error. A malformed user
    /// file is skipped with a warning.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::defaults()?;
        let (path, explicit) = match path {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (user_config_path(), false),
        };
        let Some(path) = path else {
            return Ok(config);
        };
        if !explicit && !path.exists() {
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        match toml::from_str::<ConfigFile>(&contents) {
            Ok(user) => {
                config.merge(user);
                config.source = Some(path.clone());
                debug!(target: "config", "loaded {}", path.display());
            }
            Err(e) => warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e),
        }
        Ok(config)
    }

    /// The embedded defaults alone.
    pub fn defaults() -> ConfigResult<Self> {
        let file = toml::from_str(DEFAULT_CONFIG).map_err(ConfigError::Embedded)?;
        Ok(Self { file, source: None })
    }

    /// Parse `contents` as a user file over the defaults.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        let mut config = Self::defaults()?;
        let user = toml::from_str(contents).map_err(ConfigError::Parse)?;
        config.merge(user);
        Ok(config)
    }

    /// User file the configuration was merged from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn merge(&mut self, user: ConfigFile) {
        merge_thread(&mut self.file.thread, user.thread);
        merge_soundcard(&mut self.file.soundcard, user.soundcard);
        merge_sequencer(&mut self.file.sequencer, user.sequencer);
        merge_engine(&mut self.file.engine, user.engine);
    }

    // --- Overrides ---

    pub fn set_single_threaded(&mut self, single: bool) {
        let mode = if single { "single" } else { "threaded" };
        self.file.thread.mode = Some(mode.to_string());
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.file.engine.bpm = Some(bpm);
    }

    pub fn set_soundcard_backend(&mut self, backend: SoundcardBackend) {
        let name = match backend {
            SoundcardBackend::Null => "null",
            SoundcardBackend::Cpal => "cpal",
        };
        self.file.soundcard.backend = Some(name.to_string());
    }

    pub fn set_task_mode(&mut self, mode: TaskMode) {
        let name = match mode {
            TaskMode::Worker => "worker",
            TaskMode::Inline => "inline",
        };
        self.file.engine.task_queue = Some(name.to_string());
    }

    // --- Typed views ---

    pub fn tree(&self) -> ConfigResult<TreeConfig> {
        let fallback = TreeConfig::default();
        let t = &self.file.thread;
        let mode = match t.mode.as_deref() {
            None | Some("threaded") => TreeMode::Threaded,
            Some("single") => TreeMode::SingleThreaded,
            Some(other) => return Err(invalid("thread.mode", other)),
        };
        Ok(TreeConfig {
            mode,
            start_timeout: t
                .start_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(fallback.start_timeout),
            max_precision: positive(t.max_precision, "thread.max_precision")?.unwrap_or(fallback.max_precision),
        })
    }

    pub fn engine(&self) -> ConfigResult<EngineConfig> {
        let fallback = EngineConfig::default();
        let e = &self.file.engine;
        let task_mode = match e.task_queue.as_deref() {
            None | Some("worker") => TaskMode::Worker,
            Some("inline") => TaskMode::Inline,
            Some(other) => return Err(invalid("engine.task_queue", other)),
        };
        Ok(EngineConfig {
            tree: self.tree()?,
            overclock: self.file.thread.overclock.unwrap_or(fallback.overclock).max(0.0),
            super_threaded_channels: e.super_threaded_channels.unwrap_or(fallback.super_threaded_channels),
            task_mode,
            bpm: positive(e.bpm, "engine.bpm")?.unwrap_or(fallback.bpm),
            delay_factor: positive(e.delay_factor, "engine.delay_factor")?.unwrap_or(fallback.delay_factor),
        })
    }

    pub fn presets(&self) -> ConfigResult<Presets> {
        let fallback = Presets::default();
        let s = &self.file.soundcard;
        let format = match s.format.as_deref() {
            None => fallback.format,
            Some(name) => SampleFormat::from_name(name).ok_or_else(|| invalid("soundcard.format", name))?,
        };
        let presets = Presets::new(
            s.pcm_channels.unwrap_or(fallback.pcm_channels),
            s.samplerate.unwrap_or(fallback.samplerate),
            s.buffer_size.unwrap_or(fallback.buffer_size),
            format,
        );
        if !presets.is_valid() {
            return Err(ConfigError::Invalid {
                key: "soundcard",
                value: format!("{presets:?}"),
            });
        }
        Ok(presets)
    }

    pub fn soundcard_backend(&self) -> ConfigResult<SoundcardBackend> {
        match self.file.soundcard.backend.as_deref() {
            None | Some("null") => Ok(SoundcardBackend::Null),
            Some("cpal") => Ok(SoundcardBackend::Cpal),
            Some(other) => Err(invalid("soundcard.backend", other)),
        }
    }

    pub fn cpal_host(&self) -> ConfigResult<CpalHost> {
        match self.file.soundcard.host.as_deref() {
            None => Ok(CpalHost::default()),
            Some(name) => CpalHost::from_name(name).ok_or_else(|| invalid("soundcard.host", name)),
        }
    }

    pub fn sequencer_backend(&self) -> ConfigResult<SequencerBackend> {
        match self.file.sequencer.backend.as_deref() {
            None | Some("none") => Ok(SequencerBackend::None),
            Some("null") => Ok(SequencerBackend::Null),
            Some("midir") => Ok(SequencerBackend::Midir),
            Some(other) => Err(invalid("sequencer.backend", other)),
        }
    }

    /// MIDI input port name; the first port when unset.
    pub fn sequencer_port(&self) -> Option<&str> {
        self.file.sequencer.port.as_deref()
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

fn positive(value: Option<f64>, key: &'static str) -> ConfigResult<Option<f64>> {
    match value {
        Some(v) if v.is_nan() || v <= 0.0 => Err(invalid(key, &v.to_string())),
        other => Ok(other),
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tickwork").join("config.toml"))
}

fn merge_thread(base: &mut ThreadConfig, user: ThreadConfig) {
    if user.mode.is_some() {
        base.mode = user.mode;
    }
    if user.max_precision.is_some() {
        base.max_precision = user.max_precision;
    }
    if user.start_timeout_ms.is_some() {
        base.start_timeout_ms = user.start_timeout_ms;
    }
    if user.overclock.is_some() {
        base.overclock = user.overclock;
    }
}

fn merge_soundcard(base: &mut SoundcardConfig, user: SoundcardConfig) {
    if user.backend.is_some() {
        base.backend = user.backend;
    }
    if user.host.is_some() {
        base.host = user.host;
    }
    if user.pcm_channels.is_some() {
        base.pcm_channels = user.pcm_channels;
    }
    if user.samplerate.is_some() {
        base.samplerate = user.samplerate;
    }
    if user.buffer_size.is_some() {
        base.buffer_size = user.buffer_size;
    }
    if user.format.is_some() {
        base.format = user.format;
    }
}

fn merge_sequencer(base: &mut SequencerConfig, user: SequencerConfig) {
    if user.backend.is_some() {
        base.backend = user.backend;
    }
    if user.port.is_some() {
        base.port = user.port;
    }
}

fn merge_engine(base: &mut EngineSection, user: EngineSection) {
    if user.bpm.is_some() {
        base.bpm = user.bpm;
    }
    if user.delay_factor.is_some() {
        base.delay_factor = user.delay_factor;
    }
    if user.super_threaded_channels.is_some() {
        base.super_threaded_channels = user.super_threaded_channels;
    }
    if user.task_queue.is_some() {
        base.task_queue = user.task_queue;
    }
}
