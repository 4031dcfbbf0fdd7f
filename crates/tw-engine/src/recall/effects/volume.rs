//! `volume`: scales a voice's current buffers by the `volume` port.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use tw_ir::{buffer_util, Port, PortValue, ScopeMask};

use super::{EffectDef, Level, Setup, TemplateSpec};
use crate::audio::Audio;
use crate::recall::{flags, RecallHandler, RecallKind, RunContext, SharedPort};

pub(crate) static DEF: EffectDef = EffectDef {
    name: "volume",
    level: Level::Channel,
    scopes: ScopeMask::ALL,
    ports,
    templates,
};

fn ports(_: &Audio) -> Vec<SharedPort> {
    vec![Arc::new(Mutex::new(
        Port::new("volume", PortValue::Float(1.0)).with_range(0.0, 2.0),
    ))]
}

fn templates(_: &Setup) -> Vec<TemplateSpec> {
    vec![
        TemplateSpec::new(RecallKind::Channel, VolumeChannel),
        TemplateSpec::new(RecallKind::ChannelRun, VolumeChannelRun)
            .flags(flags::PERSISTENT)
            .depends_on("volume", RecallKind::Channel),
    ]
}

/// Holds the channel's volume configuration.
#[derive(Debug, Default)]
pub struct VolumeChannel;

impl RecallHandler for VolumeChannel {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(VolumeChannel)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug, Default)]
pub struct VolumeChannelRun;

impl RecallHandler for VolumeChannelRun {
    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(VolumeChannelRun)
    }

    fn run_inter(&mut self, ctx: &mut RunContext) {
        let gain = ctx
            .dependency("volume")
            .and_then(|c| c.port_value("volume"))
            .or_else(|| ctx.port("volume"))
            .map_or(1.0, PortValue::as_f64) as f32;
        if gain == 1.0 {
            return;
        }
        let rid = ctx.recall_id().id();
        for recycling in ctx.recyclings() {
            for signal in recycling.voice_signals(rid) {
                signal.with_mut(|s| {
                    if let Some(buffer) = s.current_buffer_mut() {
                        buffer_util::scale(buffer, gain);
                    }
                });
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
