//! `copy`: copies an input's voice signals into its mapped outputs.
//!
//! The channel run spawns one `copy-audio-signal` child per source signal
//! and destination recycling. A child owns the destination signal it
//! creates and releases it when it is done.

use std::any::Any;
use std::sync::{Arc, Weak};

use tw_ir::buffer_util;

use super::{no_ports, EffectDef, Level, Setup, TemplateSpec, NOT_SEQUENCER};
use crate::channel::Direction;
use crate::recall::{Provider, RecallHandler, RecallKind, RunContext};
use crate::recycling::Recycling;
use crate::signal::AudioSignal;

pub(crate) static DEF: EffectDef = EffectDef {
    name: "copy",
    level: Level::Channel,
    scopes: NOT_SEQUENCER,
    ports: no_ports,
    templates,
};

fn templates(setup: &Setup) -> Vec<TemplateSpec> {
    match setup.channel.map(|c| c.direction()) {
        Some(Direction::Input) => vec![TemplateSpec::new(RecallKind::ChannelRun, CopyChannelRun::default())],
        _ => Vec::new(),
    }
}

/// Spawns copy children for new voice signals on its input.
#[derive(Debug, Default)]
pub struct CopyChannelRun {
    /// (source signal, destination recycling) pairs already handled.
    copied: Vec<(u64, u64)>,
}

impl RecallHandler for CopyChannelRun {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(CopyChannelRun::default())
    }

    fn feed_input_queue(&mut self, ctx: &mut RunContext) {
        let Some(input) = ctx.channel() else {
            return;
        };
        let rid = ctx.recall_id().id();
        let destinations: Vec<Arc<Recycling>> = input
            .mapped()
            .iter()
            .filter_map(|output| output.own_recycling())
            .collect();

        for recycling in input.recyclings() {
            for source in recycling.voice_signals(rid) {
                for destination in &destinations {
                    let key = (source.id(), destination.id());
                    if self.copied.contains(&key) {
                        continue;
                    }
                    self.copied.push(key);
                    ctx.spawn_child(
                        "copy-audio-signal",
                        Provider::AudioSignal(Arc::downgrade(&source)),
                        Box::new(CopyAudioSignal::new(source.clone(), destination)),
                    );
                }
            }
        }
    }

    fn do_feedback(&mut self, ctx: &mut RunContext) {
        let rid = ctx.recall_id().id();
        let children_over = ctx.recall().children().iter().all(|c| c.stage().is_over());
        let sources_over = ctx
            .recyclings()
            .iter()
            .flat_map(|r| r.voice_signals(rid))
            .all(|s| s.is_exhausted());
        if children_over && sources_over {
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

/// Copies one source signal into a destination signal it creates.
///
/// The source body is resampled to the destination rate up front. Every
/// destination buffer is then filled by two copies: the tail of the
/// previous body buffer into the leading `attack` frames, the head of the
/// current one after it.
pub struct CopyAudioSignal {
    source: Arc<AudioSignal>,
    recycling: Weak<Recycling>,
    destination: Option<Arc<AudioSignal>>,
    body: Vec<Vec<f32>>,
    attack: usize,
}

impl CopyAudioSignal {
    pub fn new(source: Arc<AudioSignal>, recycling: &Arc<Recycling>) -> Self {
        Self {
            source,
            recycling: Arc::downgrade(recycling),
            destination: None,
            body: Vec::new(),
            attack: 0,
        }
    }

    pub fn destination(&self) -> Option<&Arc<AudioSignal>> {
        self.destination.as_ref()
    }

    /// Attack of the destination in frames.
    pub fn attack(&self) -> usize {
        self.attack
    }

    fn setup(&mut self, recall_id: u64) -> Option<Arc<AudioSignal>> {
        let recycling = self.recycling.upgrade()?;
        let target = recycling.presets();
        let (samples, attack, rate) = self.source.with(|s| {
            let skip = (s.attack as usize).min(s.sample_count());
            (s.samples().split_off(skip), s.attack, s.samplerate)
        });

        let body = buffer_util::resample(&samples, rate, target.samplerate);
        let size = target.buffer_size.max(1) as usize;
        self.attack = (buffer_util::rescale_attack(attack, rate, target.samplerate) as usize).min(size - 1);
        self.body = body.chunks(size).map(|c| {
            let mut buffer = c.to_vec();
            buffer.resize(size, 0.0);
            buffer
        }).collect();

        let buffers = self.body.len() + usize::from(self.attack > 0);
        let destination = Arc::new(AudioSignal::new(&target, Some(recall_id)));
        destination.with_mut(|d| {
            d.attack = self.attack as u32;
            d.stream = vec![vec![0.0; size]; buffers];
            d.current = (buffers > 0).then_some(0);
        });
        recycling.add_signal(destination.clone());
        self.destination = Some(destination.clone());
        Some(destination)
    }
}

impl RecallHandler for CopyAudioSignal {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(CopyAudioSignal {
            source: self.source.clone(),
            recycling: self.recycling.clone(),
            destination: None,
            body: Vec::new(),
            attack: 0,
        })
    }

    fn run_pre(&mut self, ctx: &mut RunContext) {
        let destination = match &self.destination {
            Some(d) => d.clone(),
            None => match self.setup(ctx.recall_id().id()) {
                Some(d) => d,
                None => {
                    ctx.request_done();
                    return;
                }
            },
        };

        let body = &self.body;
        let attack = self.attack;
        let copied = destination.with_mut(|d| {
            let Some(i) = d.current else {
                return false;
            };
            let Some(buffer) = d.stream.get_mut(i) else {
                return false;
            };
            let prev = i.checked_sub(1).and_then(|p| body.get(p)).map(Vec::as_slice);
            let src = body.get(i).map(Vec::as_slice).unwrap_or(&[]);
            buffer_util::copy_with_attack(buffer, prev, src, attack, 1.0);
            true
        });
        if !copied {
            ctx.request_done();
        }
    }

    fn cleanup(&mut self, _ctx: &mut RunContext) {
        if let (Some(destination), Some(recycling)) = (self.destination.take(), self.recycling.upgrade()) {
            recycling.remove_signal(destination.id());
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
