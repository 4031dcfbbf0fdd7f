//! `pattern`: plays the input's template on active sequencer steps.

use std::any::Any;
use std::sync::Arc;

use tw_ir::{Pattern, DEFAULT_STEPS};

use super::count_beats::CountBeatsAudioRun;
use super::delay::DelayAudioRun;
use super::{no_ports, EffectDef, Level, Setup, TemplateSpec, SEQUENCER};
use crate::audio::Audio;
use crate::channel::Direction;
use crate::error::{GraphError, GraphResult};
use crate::recall::{RecallHandler, RecallKind, RecallList, RunContext};
use crate::signal::AudioSignal;

pub(crate) static DEF: EffectDef = EffectDef {
    name: "pattern",
    level: Level::Channel,
    scopes: SEQUENCER,
    ports: no_ports,
    templates,
};

fn templates(setup: &Setup) -> Vec<TemplateSpec> {
    if setup.channel.map(|c| c.direction()) != Some(Direction::Input) {
        return Vec::new();
    }
    vec![
        TemplateSpec::new(
            RecallKind::Channel,
            PatternChannel {
                pattern: Pattern::new(1, DEFAULT_STEPS),
            },
        ),
        TemplateSpec::new(RecallKind::ChannelRun, PatternChannelRun::default())
            .depends_on("delay", RecallKind::AudioRun)
            .depends_on("count-beats", RecallKind::AudioRun)
            .depends_on("pattern", RecallKind::Channel),
    ]
}

/// Step bits of one input channel.
#[derive(Debug)]
pub struct PatternChannel {
    pattern: Pattern,
}

impl Default for PatternChannel {
    fn default() -> Self {
        Self {
            pattern: Pattern::new(1, DEFAULT_STEPS),
        }
    }
}

impl PatternChannel {
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn pattern_mut(&mut self) -> &mut Pattern {
        &mut self.pattern
    }
}

impl RecallHandler for PatternChannel {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(PatternChannel {
            pattern: self.pattern.clone(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Allocates a voice signal from the input's template in every mapped
/// output on each active step. Done once the beat counter is.
#[derive(Debug, Default)]
pub struct PatternChannelRun {
    played: u64,
}

impl PatternChannelRun {
    /// Steps played so far.
    pub fn played(&self) -> u64 {
        self.played
    }
}

impl RecallHandler for PatternChannelRun {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(PatternChannelRun::default())
    }

    fn run_inter(&mut self, ctx: &mut RunContext) {
        let Some(counter) = ctx.dependency("count-beats") else {
            ctx.request_done();
            return;
        };
        if counter.stage().is_over() {
            ctx.request_done();
            return;
        }
        let fired = ctx
            .dependency("delay")
            .and_then(|d| d.with_handler(DelayAudioRun::fired))
            .unwrap_or(false);
        if !fired {
            return;
        }
        let step = counter.with_handler(CountBeatsAudioRun::counter).unwrap_or(0);
        let on = ctx
            .dependency("pattern")
            .and_then(|p| {
                p.with_handler(|pc: &PatternChannel| {
                    let length = pc.pattern.length().max(1);
                    pc.pattern.is_on(0, (step % length as u64) as u32)
                })
            })
            .unwrap_or(false);
        if !on {
            return;
        }

        let Some(input) = ctx.channel() else {
            return;
        };
        let Some(template) = input.recyclings().iter().find_map(|r| r.template()) else {
            return;
        };
        if template.is_empty() {
            return;
        }
        let rid = ctx.recall_id().id();
        let attack = ctx.soundcard().map(|s| s.lock().attack()).unwrap_or(0);
        for output in input.mapped() {
            for recycling in output.recyclings() {
                let signal = AudioSignal::from_template(&template, rid, attack);
                signal.apply_presets(&recycling.presets());
                recycling.add_signal(Arc::new(signal));
            }
        }
        self.played += 1;
        log::trace!(target: "recall", "pattern step {step} on {}", input.name());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Set a step of the pattern on input `line` of `audio`.
pub fn set_step(audio: &Audio, line: u32, step: u32, on: bool) -> GraphResult<()> {
    with_pattern(audio, line, |p| p.set(0, step, on))
}

/// Step bits of input `line`, if it has a pattern.
pub fn pattern_of(audio: &Audio, line: u32) -> GraphResult<Pattern> {
    with_pattern(audio, line, |p| p.clone())
}

/// Run `f` on the pattern template of input `line`.
pub fn with_pattern<R>(audio: &Audio, line: u32, f: impl FnOnce(&mut Pattern) -> R) -> GraphResult<R> {
    let input = audio.channel(Direction::Input, line)?;
    let template = [RecallList::Play, RecallList::Recall]
        .into_iter()
        .flat_map(|list| input.recalls(list))
        .find(|r| r.is_template() && r.effect() == DEF.name && r.kind() == RecallKind::Channel)
        .ok_or_else(|| GraphError::UnknownEffect(format!("{} on {}", DEF.name, input.name())))?;
    template
        .with_handler_mut(|pc: &mut PatternChannel| f(&mut pc.pattern))
        .ok_or_else(|| GraphError::UnknownEffect(format!("{} on {}", DEF.name, input.name())))
}
