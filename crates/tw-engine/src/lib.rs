//! Audio graph and per-voice recall engine for tickwork.
//!
//! Audios own channels, channels own recyclings of audio signals, and
//! recall templates attached to both are duplicated into a tree of
//! recycling contexts whenever a voice starts. The [`thread`] module hangs
//! that machinery off a `tw-thread` tree, and [`EngineContext`] wires it
//! together with soundcards, sequencers and the task queue.

pub mod audio;
pub mod channel;
mod connectable;
mod engine;
mod error;
pub mod link;
mod object;
pub mod playback;
pub mod recall;
pub mod recall_id;
pub mod recycling;
mod registry;
pub mod signal;
pub mod snapshot;
pub mod task;
pub mod thread;

pub use audio::Audio;
pub use channel::{Channel, Direction};
pub use connectable::Connectable;
pub use engine::{EngineConfig, EngineContext, TaskMode};
pub use error::{EngineError, EngineResult, GraphError, GraphResult};
pub use link::{link, unlink};
pub use playback::{Playback, PlaybackDomain};
pub use recall::effects::pattern::{pattern_of, set_step};
pub use recall::{
    Recall, RecallContainer, RecallFactory, RecallKind, RecallList, RecallStage, Target, Voice, VoiceState,
};
pub use recall_id::{RecallId, RecyclingContext};
pub use recycling::Recycling;
pub use registry::{AudioKey, AudioRegistry};
pub use signal::AudioSignal;
pub use snapshot::{AudioSnapshot, ChannelSnapshot, GraphSnapshot, RecallSnapshot};
pub use thread::{AudioLoop, ExportHandle, ExportSink};
