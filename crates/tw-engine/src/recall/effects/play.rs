//! `play`: mixes a voice's current buffers into the soundcard.

use std::any::Any;

use tw_ir::ScopeMask;

use super::{no_ports, EffectDef, Level, Setup, TemplateSpec};
use crate::recall::{flags, RecallHandler, RecallKind, RunContext};

pub(crate) static DEF: EffectDef = EffectDef {
    name: "play",
    level: Level::Channel,
    scopes: ScopeMask::ALL,
    ports: no_ports,
    templates,
};

fn templates(_: &Setup) -> Vec<TemplateSpec> {
    vec![TemplateSpec::new(RecallKind::ChannelRun, PlayChannelRun::default()).flags(flags::PERSISTENT)]
}

/// Mixes every current buffer of its voice into the soundcard buffer at the
/// channel's audio channel. A mono audio feeds every PCM channel.
#[derive(Debug, Default)]
pub struct PlayChannelRun {
    mixed: u64,
}

impl PlayChannelRun {
    /// Buffers mixed so far.
    pub fn mixed(&self) -> u64 {
        self.mixed
    }
}

impl RecallHandler for PlayChannelRun {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(PlayChannelRun::default())
    }

    fn run_post(&mut self, ctx: &mut RunContext) {
        let (Some(channel), Some(soundcard)) = (ctx.channel(), ctx.soundcard()) else {
            return;
        };
        let mono = channel.audio().is_some_and(|a| a.audio_channels() == 1);
        let rid = ctx.recall_id().id();
        let signals: Vec<_> = channel
            .recyclings()
            .iter()
            .flat_map(|r| r.voice_signals(rid))
            .collect();
        if signals.is_empty() {
            return;
        }

        let mut card = soundcard.lock();
        let buffer = card.buffer_mut();
        let pcm = buffer.channels();
        if pcm == 0 {
            return;
        }
        let targets = if mono { 0..pcm } else {
            let ch = (channel.audio_channel() % pcm as u32) as u16;
            ch..ch + 1
        };
        for signal in signals {
            signal.with(|s| {
                if let Some(current) = s.current_buffer() {
                    for ch in targets.clone() {
                        buffer.mix_into_channel(ch, current, 1.0);
                    }
                    self.mixed += 1;
                }
            });
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
