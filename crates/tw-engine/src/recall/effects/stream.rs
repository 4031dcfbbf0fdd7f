//! `stream`: moves a voice's signals forward one buffer per tick.

use std::any::Any;
use std::sync::Arc;

use tw_ir::SoundScope;

use super::{no_ports, EffectDef, Level, Setup, TemplateSpec};
use crate::recall::{RecallHandler, RecallKind, RecallList, RunContext};
use crate::signal::AudioSignal;

pub(crate) static DEF: EffectDef = EffectDef {
    name: "stream",
    level: Level::Channel,
    scopes: tw_ir::ScopeMask::ALL,
    ports: no_ports,
    templates,
};

fn templates(_: &Setup) -> Vec<TemplateSpec> {
    vec![TemplateSpec::new(RecallKind::ChannelRun, StreamChannelRun::default())]
}

/// Starts the channel's template as a voice signal and advances the voice's
/// signals after every tick.
///
/// Outside the sequencer it is done once nothing is left to play. In the
/// sequencer it releases played out steps and is done once the beat
/// counter stopped and the last step played out.
#[derive(Debug, Default)]
pub struct StreamChannelRun {
    advanced: u64,
}

impl StreamChannelRun {
    /// Buffers advanced so far.
    pub fn advanced(&self) -> u64 {
        self.advanced
    }
}

impl RecallHandler for StreamChannelRun {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(StreamChannelRun::default())
    }

    fn run_init_pre(&mut self, ctx: &mut RunContext) {
        if ctx.scope() == SoundScope::Sequencer {
            return;
        }
        let Some(recycling) = ctx.channel().and_then(|c| c.own_recycling()) else {
            return;
        };
        let rid = ctx.recall_id().id();
        if !recycling.voice_signals(rid).is_empty() {
            return;
        }
        let Some(template) = recycling.template() else {
            return;
        };
        if template.is_empty() {
            return;
        }
        let attack = ctx.soundcard().map(|s| s.lock().attack()).unwrap_or(0);
        recycling.add_signal(Arc::new(AudioSignal::from_template(&template, rid, attack)));
    }

    fn feed_output_queue(&mut self, ctx: &mut RunContext) {
        let rid = ctx.recall_id().id();
        let mut playing = false;
        for recycling in ctx.recyclings() {
            for signal in recycling.voice_signals(rid) {
                let more = signal.with_mut(|s| !s.is_exhausted() && s.advance());
                if more {
                    playing = true;
                } else if ctx.scope() == SoundScope::Sequencer {
                    recycling.remove_signal(signal.id());
                }
            }
        }
        self.advanced += 1;

        if !playing && (ctx.scope() != SoundScope::Sequencer || sequencing_ended(ctx)) {
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

/// Whether the beat counter of the voice's toplevel audio has stopped.
fn sequencing_ended(ctx: &RunContext) -> bool {
    let mut context = ctx.recall_id().context().clone();
    while let Some(parent) = context.parent() {
        context = parent;
    }
    let Some(audio) = ctx.audio() else {
        return true;
    };
    audio
        .find_container(super::count_beats::DEF.name, RecallList::Play)
        .and_then(|c| c.instance(RecallKind::AudioRun, context.id(), None))
        .map_or(true, |counter| counter.stage().is_over())
}
