//! Error type for device backends.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    /// No device of the requested kind is available.
    #[error("no audio device available")]
    NoDevice,

    #[error("unknown audio host '{0}'")]
    UnknownHost(String),

    #[error("device init error: {0}")]
    DeviceInit(String),

    #[error("stream create error: {0}")]
    StreamCreate(String),

    /// The running stream reported a failure. Latched until the device restarts.
    #[error("stream error: {0}")]
    Stream(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("invalid presets: {0}")]
    InvalidPresets(String),

    #[error("midi error: {0}")]
    Midi(String),

    #[error("device is not running")]
    NotRunning,
}

pub type AudioResult<T> = Result<T, AudioError>;
