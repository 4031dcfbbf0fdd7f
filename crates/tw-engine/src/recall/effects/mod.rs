//! Built-in effects.
//!
//! Each effect describes its ports and the templates the factory creates
//! for it. Lookup is by name.

pub mod copy;
pub mod count_beats;
pub mod delay;
pub mod pattern;
pub mod play;
pub mod stream;
pub mod volume;

use std::sync::Arc;

use tw_ir::{ScopeMask, SoundScope};

use crate::audio::Audio;
use crate::channel::Channel;
use crate::recall::{RecallDependency, RecallHandler, RecallKind, SharedPort};

/// Whether an effect's templates attach to the audio or to each channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Level {
    Audio,
    Channel,
}

/// What a template builder gets to see.
pub(crate) struct Setup<'a> {
    pub audio: &'a Arc<Audio>,
    pub channel: Option<&'a Arc<Channel>>,
    pub ports: &'a [SharedPort],
}

pub(crate) struct TemplateSpec {
    pub kind: RecallKind,
    pub flags: u32,
    pub dependencies: Vec<RecallDependency>,
    pub handler: Box<dyn RecallHandler>,
}

impl TemplateSpec {
    pub fn new(kind: RecallKind, handler: impl RecallHandler) -> Self {
        Self {
            kind,
            flags: 0,
            dependencies: Vec::new(),
            handler: Box::new(handler),
        }
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    pub fn depends_on(mut self, effect: &str, kind: RecallKind) -> Self {
        self.dependencies.push(RecallDependency::new(effect, kind));
        self
    }
}

pub(crate) struct EffectDef {
    pub name: &'static str,
    pub level: Level,
    pub scopes: ScopeMask,
    pub ports: fn(&Audio) -> Vec<SharedPort>,
    pub templates: fn(&Setup) -> Vec<TemplateSpec>,
}

/// Every scope but the sequencer.
pub(crate) const NOT_SEQUENCER: ScopeMask =
    ScopeMask::from_bits(ScopeMask::ALL.bits() & !SoundScope::Sequencer.bit());

/// Only the sequencer.
pub(crate) const SEQUENCER: ScopeMask = ScopeMask::EMPTY.with(SoundScope::Sequencer);

pub(crate) fn no_ports(_: &Audio) -> Vec<SharedPort> {
    Vec::new()
}

static EFFECTS: [&EffectDef; 7] = [
    &stream::DEF,
    &copy::DEF,
    &play::DEF,
    &volume::DEF,
    &delay::DEF,
    &count_beats::DEF,
    &pattern::DEF,
];

pub(crate) fn lookup(name: &str) -> Option<&'static EffectDef> {
    EFFECTS.iter().copied().find(|e| e.name == name)
}

/// Names of the built-in effects.
pub fn names() -> impl Iterator<Item = &'static str> {
    EFFECTS.iter().map(|e| e.name)
}
