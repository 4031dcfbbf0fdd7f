//! Engine threads: the runners hung into the thread tree.
//!
//! ```text
//! main-loop (MainLoop)
//! ├── audio-loop (AudioLoopRun)          post-sync
//! │   ├── channel threads (ChannelThread) pre-sync
//! │   └── soundcard (SoundcardThread)    post-sync
//! │       └── export (ExportThread)      post-sync
//! └── midi-loop (MidiLoop)               post-sync
//!     └── sequencer (SequencerThread)
//! ```

mod audio_loop;
mod channel_thread;
mod export_thread;
mod main_loop;
mod sequencer_thread;
mod soundcard_thread;

pub use audio_loop::{AudioLoop, AudioLoopRun};
pub use channel_thread::ChannelThread;
pub use export_thread::{ExportHandle, ExportSink, ExportThread};
pub use main_loop::MainLoop;
pub use sequencer_thread::{MidiLoop, SequencerThread};
pub use soundcard_thread::SoundcardThread;
