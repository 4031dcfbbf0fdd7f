//! Errors of the controller layer.

use std::path::PathBuf;

use thiserror::Error;
use tw_audio::AudioError;
use tw_engine::EngineError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("embedded config.toml is broken: {0}")]
    Embedded(toml::de::Error),

    #[error("config parse error: {0}")]
    Parse(toml::de::Error),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("export error: {0}")]
    Io(#[from] std::io::Error),

    /// A settings model holds a value the engine would refuse.
    #[error("invalid {name}: {value}")]
    InvalidSetting { name: &'static str, value: String },

    #[error("no soundcard")]
    NoSoundcard,

    /// The engine dropped a task before replying.
    #[error("task '{0}' was dropped")]
    TaskDropped(&'static str),
}

pub type ControllerResult<T> = Result<T, ControllerError>;
