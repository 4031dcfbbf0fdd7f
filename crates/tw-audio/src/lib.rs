//! Device backends for tickwork.
//!
//! Soundcards and sequencers sit behind two traits so backends are
//! swappable: a software soundcard for offline rendering and tests, a cpal
//! soundcard for real output, and null/midir sequencers for MIDI input.

mod cpal_backend;
mod error;
mod midi_backend;
mod null_backend;
mod sequencer;
mod soundcard;
mod transport;

pub use cpal_backend::{CpalHost, CpalSoundcard};
pub use error::{AudioError, AudioResult};
pub use midi_backend::{list_ports, MidiPortInfo, MidirSequencer};
pub use null_backend::{Capture, NullSoundcard};
pub use sequencer::{
    shared_sequencer, MidiInjector, NullSequencer, Sequencer, SequencerCore, SharedSequencer,
};
pub use soundcard::{shared_soundcard, SharedSoundcard, Soundcard, SoundcardCore};
pub use transport::Transport;
