//! `count-beats`: the sequencer position, advanced on every delay step.

use std::any::Any;

use tw_ir::{PortValue, DEFAULT_STEPS};

use super::delay::DelayAudioRun;
use super::{EffectDef, Level, Setup, TemplateSpec, SEQUENCER};
use crate::audio::Audio;
use crate::recall::{shared_port, RecallHandler, RecallKind, RunContext, SharedPort};

pub(crate) static DEF: EffectDef = EffectDef {
    name: "count-beats",
    level: Level::Audio,
    scopes: SEQUENCER,
    ports,
    templates,
};

fn ports(_: &Audio) -> Vec<SharedPort> {
    vec![
        shared_port("loop", PortValue::Bool(false)),
        shared_port("sequencer-loop-start", PortValue::UInt(0)),
        shared_port("sequencer-loop-end", PortValue::UInt(DEFAULT_STEPS as u64)),
    ]
}

fn templates(_: &Setup) -> Vec<TemplateSpec> {
    vec![
        TemplateSpec::new(RecallKind::Audio, CountBeatsAudio),
        TemplateSpec::new(RecallKind::AudioRun, CountBeatsAudioRun::default())
            .depends_on("delay", RecallKind::AudioRun),
    ]
}

/// Holds the loop ports. Timing comes from the `delay` run.
#[derive(Debug, Default)]
pub struct CountBeatsAudio;

impl RecallHandler for CountBeatsAudio {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(CountBeatsAudio)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Sequencer position of one voice.
///
/// Steps run from `sequencer-loop-start` up to, not including,
/// `sequencer-loop-end`. Without `loop` the run is done on the step after
/// the last one.
#[derive(Debug, Default)]
pub struct CountBeatsAudioRun {
    counter: u64,
    started: bool,
}

impl CountBeatsAudioRun {
    /// Current step.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl RecallHandler for CountBeatsAudioRun {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(CountBeatsAudioRun::default())
    }

    fn run_pre(&mut self, ctx: &mut RunContext) {
        let fired = ctx
            .dependency("delay")
            .and_then(|d| d.with_handler(DelayAudioRun::fired))
            .unwrap_or(false);
        if !fired {
            return;
        }

        let start = ctx.port("sequencer-loop-start").map_or(0, PortValue::as_u64);
        let end = ctx
            .port("sequencer-loop-end")
            .map_or(DEFAULT_STEPS as u64, PortValue::as_u64);
        let looping = ctx.port("loop").is_some_and(PortValue::as_bool);

        if !self.started {
            self.started = true;
            self.counter = start;
            return;
        }
        let next = self.counter + 1;
        if next < end {
            self.counter = next;
        } else if looping {
            self.counter = start;
        } else {
            ctx.request_done();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
