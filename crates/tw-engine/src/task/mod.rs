//! Graph mutations as tasks.
//!
//! Every task captures its parameters at construction and applies them in
//! `launch` under the tree lock. Fallible tasks report through an optional
//! reply channel; without one a failure is only logged.

mod playback;
mod presets;
mod registry;
mod signal;
mod tempo;
mod topology;

use crossbeam_channel::Sender;

pub use playback::{CancelAudio, CancelChannel, StartAudio, StartChannel};
pub use presets::ApplyPresets;
pub use registry::{AddAudio, RemoveAudio};
pub use signal::{AddAudioSignal, RemoveAudioSignal, SetTemplate};
pub use tempo::{ApplyBpm, BpmReport};
pub use topology::{LinkChannel, ResizeAudio, UnlinkChannel};

/// Where a task sends its outcome.
pub type Reply<T> = Option<Sender<T>>;

fn send<T>(reply: &Reply<T>, value: T) {
    if let Some(tx) = reply {
        if tx.send(value).is_err() {
            log::debug!(target: "task", "reply receiver dropped");
        }
    }
}
