//! Recall containers: the templates and live instances of one effect.

use std::sync::{Arc, Weak};

use tw_ir::PortValue;

use crate::audio::Audio;
use crate::object::{next_id, ObjectMutex};
use crate::recall::{Recall, RecallKind, RecallList, SharedPort};

#[derive(Default)]
struct ContainerState {
    templates: Vec<Arc<Recall>>,
    instances: Vec<Arc<Recall>>,
}

/// All recalls of one logical effect on one audio: the templates plus the
/// live per-voice instances.
pub struct RecallContainer {
    id: u64,
    effect: String,
    list: RecallList,
    audio: Weak<Audio>,
    ports: Vec<SharedPort>,
    state: ObjectMutex<ContainerState>,
}

impl RecallContainer {
    pub fn new(audio: &Arc<Audio>, effect: &str, list: RecallList, ports: Vec<SharedPort>) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            effect: effect.to_string(),
            list,
            audio: Arc::downgrade(audio),
            ports,
            state: ObjectMutex::default(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn effect(&self) -> &str {
        &self.effect
    }

    pub fn list(&self) -> RecallList {
        self.list
    }

    pub fn audio(&self) -> Option<Arc<Audio>> {
        self.audio.upgrade()
    }

    /// Configuration ports shared by every template and instance.
    pub fn ports(&self) -> &[SharedPort] {
        &self.ports
    }

    pub fn port_value(&self, name: &str) -> Option<PortValue> {
        self.ports
            .iter()
            .find(|p| p.lock().name.as_str() == name)
            .map(|p| p.lock().value())
    }

    pub fn templates(&self) -> Vec<Arc<Recall>> {
        self.state.with(|s| s.templates.clone())
    }

    pub fn instances(&self) -> Vec<Arc<Recall>> {
        self.state.with(|s| s.instances.clone())
    }

    pub(crate) fn add_template(&self, recall: Arc<Recall>) {
        self.state.with_mut(|s| s.templates.push(recall));
    }

    pub(crate) fn add_instance(&self, recall: Arc<Recall>) {
        self.state.with_mut(|s| s.instances.push(recall));
    }

    pub(crate) fn remove_instance(&self, id: u64) {
        self.state.with_mut(|s| s.instances.retain(|r| r.id() != id));
    }

    /// Template of `kind`, optionally bound to channel `channel_id`.
    pub fn template(&self, kind: RecallKind, channel_id: Option<u64>) -> Option<Arc<Recall>> {
        self.state.with(|s| {
            s.templates
                .iter()
                .find(|r| r.kind() == kind && (channel_id.is_none() || r.provider().channel_id() == channel_id))
                .cloned()
        })
    }

    /// Live instance of `kind` in recycling context `context_id`, optionally
    /// bound to channel `channel_id`.
    pub fn instance(&self, kind: RecallKind, context_id: u64, channel_id: Option<u64>) -> Option<Arc<Recall>> {
        self.state.with(|s| {
            s.instances
                .iter()
                .find(|r| {
                    r.kind() == kind
                        && r.recall_id().is_some_and(|rid| rid.context().id() == context_id)
                        && (channel_id.is_none() || r.provider().channel_id() == channel_id)
                })
                .cloned()
        })
    }
}

impl std::fmt::Debug for RecallContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallContainer")
            .field("id", &self.id)
            .field("effect", &self.effect)
            .field("list", &self.list)
            .finish()
    }
}
