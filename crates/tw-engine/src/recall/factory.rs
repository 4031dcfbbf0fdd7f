use std::ops::Range;
use std::sync::Arc;

use log::debug;

use crate::audio::Audio;
use crate::channel::{Channel, Direction};
use crate::error::{GraphError, GraphResult};
use crate::recall::effects::{self, Level, Setup};
use crate::recall::{Provider, Recall, RecallContainer, RecallList};

/// Channels a channel level effect is attached to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub direction: Direction,
    pub lines: Range<u32>,
}

impl Target {
    pub fn new(direction: Direction, lines: Range<u32>) -> Self {
        Self { direction, lines }
    }

    /// Every channel of `direction`.
    pub fn all(audio: &Audio, direction: Direction) -> Self {
        Self::new(direction, 0..audio.channel_count(direction) as u32)
    }

    pub fn outputs(audio: &Audio) -> Self {
        Self::all(audio, Direction::Output)
    }

    pub fn inputs(audio: &Audio) -> Self {
        Self::all(audio, Direction::Input)
    }
}

/// Builds containers and templates for named effects.
pub struct RecallFactory;

impl RecallFactory {
    /// Register the templates in the play lists.
    pub const PLAY: u8 = 1 << 0;
    /// Register the templates in the recall lists.
    pub const RECALL: u8 = 1 << 1;

    /// Create `effect` on `audio`.
    ///
    /// Audio level effects ignore `target`. Channel level effects get
    /// templates on every channel in `target`. A container that already
    /// exists for the effect and list is extended, so an effect can be
    /// added to inputs and outputs in two calls. Nothing is created if the
    /// effect or a target line is unknown.
    pub fn create(audio: &Arc<Audio>, effect: &str, target: Target, flags: u8) -> GraphResult<Vec<Arc<RecallContainer>>> {
        let def = effects::lookup(effect).ok_or_else(|| GraphError::UnknownEffect(effect.to_string()))?;
        let channels: Vec<Arc<Channel>> = match def.level {
            Level::Audio => Vec::new(),
            Level::Channel => target
                .lines
                .clone()
                .map(|line| audio.channel(target.direction, line))
                .collect::<GraphResult<_>>()?,
        };

        let lists = [(Self::PLAY, RecallList::Play), (Self::RECALL, RecallList::Recall)];
        let mut out = Vec::new();
        for (bit, list) in lists {
            if flags & bit == 0 {
                continue;
            }
            let existing = audio.find_container(def.name, list);
            if def.level == Level::Audio && existing.is_some() {
                out.extend(existing);
                continue;
            }
            let container = match existing {
                Some(c) => c,
                None => {
                    let c = RecallContainer::new(audio, def.name, list, (def.ports)(audio));
                    audio.add_container(c.clone());
                    c
                }
            };

            match def.level {
                Level::Audio => {
                    let setup = Setup {
                        audio,
                        channel: None,
                        ports: container.ports(),
                    };
                    for spec in (def.templates)(&setup) {
                        let recall = build(def.name, spec, Provider::audio(audio), list, def.scopes, &container);
                        audio.add_recall(list, recall);
                    }
                }
                Level::Channel => {
                    for channel in &channels {
                        let setup = Setup {
                            audio,
                            channel: Some(channel),
                            ports: container.ports(),
                        };
                        for spec in (def.templates)(&setup) {
                            let recall = build(def.name, spec, Provider::channel(channel), list, def.scopes, &container);
                            channel.add_recall(list, recall);
                        }
                    }
                }
            }
            debug!(target: "recall", "{} on {} ({:?}): {} templates", def.name, audio.name(), list, container.templates().len());
            out.push(container);
        }
        Ok(out)
    }
}

fn build(
    effect: &str,
    spec: effects::TemplateSpec,
    provider: Provider,
    list: RecallList,
    scopes: tw_ir::ScopeMask,
    container: &Arc<RecallContainer>,
) -> Arc<Recall> {
    let recall = Arc::new(
        Recall::new(effect, spec.kind, provider, spec.handler)
            .with_list(list)
            .with_scopes(scopes)
            .with_flags(spec.flags)
            .with_ports(container.ports().to_vec())
            .with_dependencies(spec.dependencies)
            .with_container(container),
    );
    container.add_template(recall.clone());
    recall
}
