//! Headless controller for tickwork.
//!
//! Loads the layered configuration, builds an engine with the configured
//! devices, and offers what a front end needs: playback, WAV export and
//! settings models that apply themselves through the task queue.

mod config;
mod controller;
pub mod demo;
mod error;
mod settings;
mod wav;

pub use config::{Config, SequencerBackend, SoundcardBackend};
pub use controller::Controller;
pub use error::{ConfigError, ConfigResult, ControllerError, ControllerResult};
pub use settings::{Applicable, PresetsSettings, TempoSettings};
pub use wav::WavWriter;
