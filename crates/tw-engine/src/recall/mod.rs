//! Recalls: effect and generator instances bound to audios and channels.
//!
//! A logical effect lives in a [`RecallContainer`] holding its templates:
//! audio and channel level configuration recalls plus the run templates
//! that get duplicated once per voice. Run instances are bound to a
//! [`RecallId`] and driven through the staged lifecycle by a [`Voice`].

mod container;
mod driver;
pub mod effects;
mod factory;
mod handler;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tw_ir::{Port, PortValue, ScopeMask, ScopedStaging, SoundScope, StagingFlags};

use crate::audio::Audio;
use crate::channel::Channel;
use crate::object::{next_id, ObjectMutex};
use crate::recall_id::RecallId;
use crate::recycling::Recycling;
use crate::signal::AudioSignal;

pub use container::RecallContainer;
pub use driver::{Voice, VoiceState};
pub use factory::{RecallFactory, Target};
pub use handler::{RecallHandler, RunContext, TempoAware};

/// Which of the four variants of an effect a recall is, plus the per
/// signal children some run recalls spawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecallKind {
    Audio,
    AudioRun,
    Channel,
    ChannelRun,
    Recycling,
    AudioSignal,
}

impl RecallKind {
    /// Run variants are duplicated per voice.
    pub fn is_run(self) -> bool {
        matches!(self, RecallKind::AudioRun | RecallKind::ChannelRun)
    }

    pub fn is_audio_level(self) -> bool {
        matches!(self, RecallKind::Audio | RecallKind::AudioRun)
    }
}

/// Lifecycle of one recall instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecallStage {
    Uninitialized,
    Duplicated,
    Resolved,
    RunInit,
    Running,
    Done,
    Cancelled,
    CleanedUp,
}

impl RecallStage {
    /// Done or cancelled, waiting for cleanup.
    pub fn is_finishing(self) -> bool {
        matches!(self, RecallStage::Done | RecallStage::Cancelled)
    }

    /// Will not run any further stage.
    pub fn is_over(self) -> bool {
        self >= RecallStage::Done
    }
}

/// The two recall lists of audios and channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecallList {
    /// Engine initiated signal chains of the voice's own audio.
    Play,
    /// Effects run when a voice reaches the audio from downstream.
    Recall,
}

/// Recall flags.
pub mod flags {
    pub const TEMPLATE: u32 = 1 << 0;
    /// Keeps running until the voice is cancelled.
    pub const PERSISTENT: u32 = 1 << 1;
    pub const CONNECTED: u32 = 1 << 2;
}

/// The object a recall works on.
#[derive(Clone)]
pub enum Provider {
    Audio(Weak<Audio>),
    Channel(Weak<Channel>),
    Recycling(Weak<Recycling>),
    AudioSignal(Weak<AudioSignal>),
}

impl Provider {
    pub fn audio(audio: &Arc<Audio>) -> Self {
        Provider::Audio(Arc::downgrade(audio))
    }

    pub fn channel(channel: &Arc<Channel>) -> Self {
        Provider::Channel(Arc::downgrade(channel))
    }

    pub fn channel_id(&self) -> Option<u64> {
        match self {
            Provider::Channel(c) => c.upgrade().map(|c| c.id()),
            _ => None,
        }
    }

    /// Whether both name the same object.
    pub fn same(&self, other: &Provider) -> bool {
        match (self, other) {
            (Provider::Audio(a), Provider::Audio(b)) => a.ptr_eq(b),
            (Provider::Channel(a), Provider::Channel(b)) => a.ptr_eq(b),
            (Provider::Recycling(a), Provider::Recycling(b)) => a.ptr_eq(b),
            (Provider::AudioSignal(a), Provider::AudioSignal(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// "This recall needs the `kind` recall of `effect`."
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallDependency {
    pub effect: String,
    pub kind: RecallKind,
}

impl RecallDependency {
    pub fn new(effect: &str, kind: RecallKind) -> Self {
        Self {
            effect: effect.to_string(),
            kind,
        }
    }
}

/// A shared, mutable port. Templates and their run instances hold the
/// same ports.
pub type SharedPort = Arc<Mutex<Port>>;

pub fn shared_port(name: &str, default: PortValue) -> SharedPort {
    Arc::new(Mutex::new(Port::new(name, default)))
}

struct RecallState {
    flags: u32,
    scopes: ScopeMask,
    stage: RecallStage,
    staging: ScopedStaging,
    recall_id: Option<Arc<RecallId>>,
    resolved: Vec<Option<Weak<Recall>>>,
    parent: Weak<Recall>,
    children: Vec<Arc<Recall>>,
    handler: Option<Box<dyn RecallHandler>>,
}

/// One recall: a template or a per-voice instance.
pub struct Recall {
    id: u64,
    effect: String,
    kind: RecallKind,
    list: RecallList,
    provider: Provider,
    container: Weak<RecallContainer>,
    ports: Vec<SharedPort>,
    dependencies: Vec<RecallDependency>,
    state: ObjectMutex<RecallState>,
}

impl Recall {
    /// A new template.
    pub fn new(effect: &str, kind: RecallKind, provider: Provider, handler: Box<dyn RecallHandler>) -> Self {
        Self {
            id: next_id(),
            effect: effect.to_string(),
            kind,
            list: RecallList::Play,
            provider,
            container: Weak::new(),
            ports: Vec::new(),
            dependencies: Vec::new(),
            state: ObjectMutex::new(RecallState {
                flags: flags::TEMPLATE,
                scopes: ScopeMask::ALL,
                stage: RecallStage::Uninitialized,
                staging: ScopedStaging::default(),
                recall_id: None,
                resolved: Vec::new(),
                parent: Weak::new(),
                children: Vec::new(),
                handler: Some(handler),
            }),
        }
    }

    /// Builder: recall list.
    pub fn with_list(mut self, list: RecallList) -> Self {
        self.list = list;
        self
    }

    /// Builder: scopes the recall runs in.
    pub fn with_scopes(self, scopes: ScopeMask) -> Self {
        self.state.with_mut(|s| s.scopes = scopes);
        self
    }

    /// Builder: extra flags.
    pub fn with_flags(self, flags: u32) -> Self {
        self.state.with_mut(|s| s.flags |= flags);
        self
    }

    pub fn with_ports(mut self, ports: Vec<SharedPort>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<RecallDependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub(crate) fn with_container(mut self, container: &Arc<RecallContainer>) -> Self {
        self.container = Arc::downgrade(container);
        self
    }

    /// A non-template child of `parent`, sharing its voice.
    pub(crate) fn child_of(parent: &Arc<Recall>, effect: &str, provider: Provider, handler: Box<dyn RecallHandler>) -> Arc<Recall> {
        let child = Recall::new(effect, RecallKind::AudioSignal, provider, handler).with_list(parent.list);
        child.state.with_mut(|s| {
            s.flags = 0;
            s.scopes = parent.scopes();
            s.stage = RecallStage::Resolved;
            s.recall_id = parent.recall_id();
            s.parent = Arc::downgrade(parent);
        });
        let child = Arc::new(child);
        parent.state.with_mut(|s| s.children.push(child.clone()));
        child
    }

    // --- Identity ---

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn effect(&self) -> &str {
        &self.effect
    }

    pub fn kind(&self) -> RecallKind {
        self.kind
    }

    pub fn list(&self) -> RecallList {
        self.list
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn container(&self) -> Option<Arc<RecallContainer>> {
        self.container.upgrade()
    }

    /// Channel this recall works on. Signal children use their parent's.
    pub fn channel(&self) -> Option<Arc<Channel>> {
        match &self.provider {
            Provider::Channel(c) => c.upgrade(),
            _ => self.parent().and_then(|p| p.channel()),
        }
    }

    /// Audio this recall belongs to.
    pub fn audio(&self) -> Option<Arc<Audio>> {
        match &self.provider {
            Provider::Audio(a) => a.upgrade(),
            Provider::Channel(c) => c.upgrade().and_then(|c| c.audio()),
            _ => self.parent().and_then(|p| p.audio()),
        }
    }

    // --- Ports ---

    pub fn ports(&self) -> &[SharedPort] {
        &self.ports
    }

    pub fn port(&self, name: &str) -> Option<&SharedPort> {
        self.ports.iter().find(|p| p.lock().name.as_str() == name)
    }

    pub fn port_value(&self, name: &str) -> Option<PortValue> {
        self.port(name).map(|p| p.lock().value())
    }

    /// Set a port, coercing to its type. Returns `false` if there is none.
    pub fn set_port(&self, name: &str, value: PortValue) -> bool {
        match self.port(name) {
            Some(port) => {
                port.lock().set(value);
                true
            }
            None => false,
        }
    }

    // --- Flags and lifecycle ---

    pub fn flags(&self) -> u32 {
        self.state.with(|s| s.flags)
    }

    pub fn is_template(&self) -> bool {
        self.flags() & flags::TEMPLATE != 0
    }

    pub fn is_persistent(&self) -> bool {
        self.flags() & flags::PERSISTENT != 0
    }

    pub(crate) fn set_flag(&self, flag: u32, on: bool) {
        self.state.with_mut(|s| {
            if on {
                s.flags |= flag;
            } else {
                s.flags &= !flag;
            }
        });
    }

    pub fn scopes(&self) -> ScopeMask {
        self.state.with(|s| s.scopes)
    }

    pub fn stage(&self) -> RecallStage {
        self.state.with(|s| s.stage)
    }

    pub(crate) fn set_stage(&self, stage: RecallStage) {
        self.state.with_mut(|s| s.stage = stage);
    }

    pub fn staging(&self, scope: SoundScope) -> StagingFlags {
        self.state.with(|s| s.staging.get(scope))
    }

    /// Mark `stage` done for `scope`; `false` if it already ran this tick.
    pub(crate) fn try_advance(&self, scope: SoundScope, stage: StagingFlags) -> bool {
        self.state.with_mut(|s| s.staging.try_advance(scope, stage))
    }

    pub(crate) fn reset_staging(&self, scope: SoundScope) {
        self.state.with_mut(|s| s.staging.reset(scope));
    }

    pub fn recall_id(&self) -> Option<Arc<RecallId>> {
        self.state.with(|s| s.recall_id.clone())
    }

    // --- Dependencies ---

    pub fn dependencies(&self) -> &[RecallDependency] {
        &self.dependencies
    }

    pub(crate) fn set_resolved(&self, resolved: Vec<Option<Weak<Recall>>>) {
        self.state.with_mut(|s| s.resolved = resolved);
    }

    /// The resolved recall for dependency `effect`, if it was found.
    pub fn dependency(&self, effect: &str) -> Option<Arc<Recall>> {
        let index = self.dependencies.iter().position(|d| d.effect == effect)?;
        self.state
            .with(|s| s.resolved.get(index).cloned().flatten())
            .and_then(|w| w.upgrade())
    }

    // --- Children ---

    pub fn parent(&self) -> Option<Arc<Recall>> {
        self.state.with(|s| s.parent.upgrade())
    }

    pub fn children(&self) -> Vec<Arc<Recall>> {
        self.state.with(|s| s.children.clone())
    }

    pub(crate) fn remove_child(&self, id: u64) {
        self.state.with_mut(|s| s.children.retain(|c| c.id != id));
    }

    // --- Handler ---

    /// Duplicate this template for voice `recall_id`.
    ///
    /// Ports, provider, container and dependencies are shared; run state
    /// starts fresh.
    pub(crate) fn duplicate(&self, recall_id: &Arc<RecallId>) -> Arc<Recall> {
        let (flags, scopes, handler) = self.state.with(|s| {
            (
                s.flags & !flags::TEMPLATE,
                s.scopes,
                s.handler.as_ref().map(|h| h.duplicate()),
            )
        });
        Arc::new(Recall {
            id: next_id(),
            effect: self.effect.clone(),
            kind: self.kind,
            list: self.list,
            provider: self.provider.clone(),
            container: self.container.clone(),
            ports: self.ports.clone(),
            dependencies: self.dependencies.clone(),
            state: ObjectMutex::new(RecallState {
                flags,
                scopes,
                stage: RecallStage::Duplicated,
                staging: ScopedStaging::default(),
                recall_id: Some(recall_id.clone()),
                resolved: Vec::new(),
                parent: Weak::new(),
                children: Vec::new(),
                handler,
            }),
        })
    }

    pub(crate) fn take_handler(&self) -> Option<Box<dyn RecallHandler>> {
        self.state.with_mut(|s| s.handler.take())
    }

    pub(crate) fn put_handler(&self, handler: Box<dyn RecallHandler>) {
        self.state.with_mut(|s| s.handler = Some(handler));
    }

    /// Read the handler as `H`. `None` while it runs or if it is not an `H`.
    pub fn with_handler<H: 'static, R>(&self, f: impl FnOnce(&H) -> R) -> Option<R> {
        self.state
            .with(|s| s.handler.as_ref()?.as_any().downcast_ref::<H>().map(f))
    }

    pub fn with_handler_mut<H: 'static, R>(&self, f: impl FnOnce(&mut H) -> R) -> Option<R> {
        self.state
            .with_mut(|s| s.handler.as_mut()?.as_any_mut().downcast_mut::<H>().map(f))
    }

    /// Forward a tempo change if the handler is tempo aware.
    pub fn set_bpm(&self, bpm: f64) -> bool {
        self.state.with_mut(|s| match s.handler.as_mut().and_then(|h| h.tempo_aware()) {
            Some(t) => {
                t.set_bpm(bpm);
                true
            }
            None => false,
        })
    }

    pub fn is_tempo_aware(&self) -> bool {
        self.state
            .with_mut(|s| s.handler.as_mut().and_then(|h| h.tempo_aware()).is_some())
    }
}

impl std::fmt::Debug for Recall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recall")
            .field("id", &self.id)
            .field("effect", &self.effect)
            .field("kind", &self.kind)
            .field("stage", &self.stage())
            .finish()
    }
}
