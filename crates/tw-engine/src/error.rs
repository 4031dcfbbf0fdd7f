//! Error types for graph mutations and engine setup.

use thiserror::Error;
use tw_audio::AudioError;
use tw_thread::ThreadError;

/// Configuration errors from mutating calls. A call that returns one of
/// these has left the graph unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("loop in link: {source_channel} -> {target_channel}")]
    LoopInLink {
        source_channel: String,
        target_channel: String,
    },

    #[error("{0} is already linked, unlink it first")]
    AlreadyLinked(String),

    #[error("{0} is not linked")]
    NotLinked(String),

    /// Links connect an output to an input.
    #[error("invalid channel type: {0}")]
    InvalidChannelType(String),

    #[error("channel out of range: {what} {index} (have {available})")]
    ChannelOutOfRange {
        what: &'static str,
        index: u32,
        available: u32,
    },

    #[error("audio was dropped")]
    AudioDropped,

    #[error("recycling context cycle")]
    ContextCycle,

    #[error("unknown effect '{0}'")]
    UnknownEffect(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Thread(#[from] ThreadError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("engine is not initialized")]
    NotInitialized,
}

pub type EngineResult<T> = Result<T, EngineError>;
