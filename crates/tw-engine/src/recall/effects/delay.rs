//! `delay`: counts buffers and fires one sequencer step per
//! `sequencer-delay` buffers.

use std::any::Any;

use tw_ir::{absolute_delay, PortValue, DEFAULT_DELAY_FACTOR};

use super::{EffectDef, Level, Setup, TemplateSpec, SEQUENCER};
use crate::audio::Audio;
use crate::recall::{flags, shared_port, RecallHandler, RecallKind, RunContext, SharedPort, TempoAware};

pub(crate) static DEF: EffectDef = EffectDef {
    name: "delay",
    level: Level::Audio,
    scopes: SEQUENCER,
    ports,
    templates,
};

fn ports(audio: &Audio) -> Vec<SharedPort> {
    let presets = audio.presets();
    let bpm = audio.bpm();
    vec![
        shared_port("bpm", PortValue::Float(bpm)),
        shared_port("tact", PortValue::Float(DEFAULT_DELAY_FACTOR)),
        shared_port(
            "sequencer-delay",
            PortValue::Float(absolute_delay(presets.samplerate, presets.buffer_size, bpm, DEFAULT_DELAY_FACTOR)),
        ),
    ]
}

fn templates(setup: &Setup) -> Vec<TemplateSpec> {
    vec![
        TemplateSpec::new(
            RecallKind::Audio,
            DelayAudio {
                ports: setup.ports.to_vec(),
            },
        ),
        TemplateSpec::new(RecallKind::AudioRun, DelayAudioRun::default()).flags(flags::PERSISTENT),
    ]
}

fn find<'a>(ports: &'a [SharedPort], name: &str) -> Option<&'a SharedPort> {
    ports.iter().find(|p| p.lock().name.as_str() == name)
}

/// Tempo holder of the delay effect.
pub struct DelayAudio {
    ports: Vec<SharedPort>,
}

impl RecallHandler for DelayAudio {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(DelayAudio {
            ports: self.ports.clone(),
        })
    }

    fn tempo_aware(&mut self) -> Option<&mut dyn TempoAware> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TempoAware for DelayAudio {
    fn bpm(&self) -> f64 {
        find(&self.ports, "bpm").map_or(0.0, |p| p.lock().value().as_f64())
    }

    fn set_bpm(&mut self, bpm: f64) {
        if let Some(port) = find(&self.ports, "bpm") {
            port.lock().set(PortValue::Float(bpm));
        }
    }
}

/// Per-voice step counter.
///
/// The counter starts at zero, so the first step fires on the first tick.
/// After a step it is raised by the current delay, and it drops by one
/// every tick.
#[derive(Debug, Default)]
pub struct DelayAudioRun {
    counter: f64,
    fired: bool,
    steps: u64,
}

impl DelayAudioRun {
    /// Whether a step fired this tick.
    pub fn fired(&self) -> bool {
        self.fired
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl RecallHandler for DelayAudioRun {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(DelayAudioRun::default())
    }

    fn automate(&mut self, ctx: &mut RunContext) {
        let presets = ctx.audio().map(|a| a.presets()).unwrap_or_default();
        let bpm = ctx.port_f64("bpm", tw_ir::DEFAULT_BPM);
        let tact = ctx.port_f64("tact", DEFAULT_DELAY_FACTOR);
        let delay = absolute_delay(presets.samplerate, presets.buffer_size, bpm, tact);
        ctx.recall().set_port("sequencer-delay", PortValue::Float(delay));

        self.fired = self.counter <= 0.0;
        if self.fired {
            self.counter += delay.max(1.0);
            self.steps += 1;
        }
        self.counter -= 1.0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
