//! Core data types for the tickwork audio engine.
//!
//! Plain values shared by the scheduler, the device backends and the
//! engine graph: presets and sample formats, the planar audio buffer,
//! buffer math, sound scopes, staging flags, ports, step patterns and
//! tempo timing tables.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod audio_buffer;
pub mod buffer_util;
mod pattern;
mod port;
mod presets;
mod scope;
mod staging;
pub mod timing;

pub use audio_buffer::{AudioBuffer, MAX_CHANNELS};
pub use pattern::{Pattern, DEFAULT_STEPS};
pub use port::{Port, PortValue, PORT_NAME_LEN};
pub use presets::{
    Presets, SampleFormat, DEFAULT_BPM, DEFAULT_BUFFER_SIZE, DEFAULT_DELAY_FACTOR,
    DEFAULT_PCM_CHANNELS, DEFAULT_SAMPLERATE,
};
pub use scope::{ScopeMask, SoundScope, SCOPE_COUNT};
pub use staging::{ScopedStaging, StagingFlags};
pub use timing::{absolute_delay, DelayTable};
