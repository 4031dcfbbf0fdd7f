//! Voices: drive the recalls of one recall id through their stages.
//!
//! On the first tick a voice duplicates the run templates it reaches and
//! resolves their dependencies. Every tick then runs each stage of
//! [`StagingFlags::ORDER`] across all live recalls before the next stage
//! begins, cleans up finished recalls and ends the voice once every
//! non-persistent recall is gone.

use std::sync::{Arc, Weak};

use log::{debug, trace, warn};
use parking_lot::Mutex;
use tw_ir::{SoundScope, StagingFlags};

use crate::audio::Audio;
use crate::channel::{Channel, Direction};
use crate::error::GraphResult;
use crate::recall::{Provider, Recall, RecallKind, RecallList, RecallStage, RunContext};
use crate::recall_id::RecallId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    Pending,
    Running,
    Finished,
}

/// Part of a voice's reach: recall templates of one audio bound to one
/// recall id.
struct Binding {
    audio: Arc<Audio>,
    channels: Vec<Arc<Channel>>,
    list: RecallList,
    recall_id: Arc<RecallId>,
}

struct VoiceInner {
    state: VoiceState,
    bindings: Vec<Binding>,
    instances: Vec<Arc<Recall>>,
    ticks: u64,
}

/// One playback instance started on a channel.
pub struct Voice {
    channel: Arc<Channel>,
    recall_id: Arc<RecallId>,
    inner: Mutex<VoiceInner>,
}

impl Voice {
    pub fn new(channel: Arc<Channel>, recall_id: Arc<RecallId>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            recall_id,
            inner: Mutex::new(VoiceInner {
                state: VoiceState::Pending,
                bindings: Vec::new(),
                instances: Vec::new(),
                ticks: 0,
            }),
        })
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn recall_id(&self) -> &Arc<RecallId> {
        &self.recall_id
    }

    pub fn scope(&self) -> SoundScope {
        self.recall_id.scope()
    }

    pub fn state(&self) -> VoiceState {
        self.inner.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state() == VoiceState::Finished
    }

    pub fn ticks(&self) -> u64 {
        self.inner.lock().ticks
    }

    /// Run instances created for this voice, finished ones included.
    pub fn instances(&self) -> Vec<Arc<Recall>> {
        self.inner.lock().instances.clone()
    }

    /// Run one tick.
    pub fn tick(&self) -> VoiceState {
        if !self.prepare() {
            return self.state();
        }
        for stage in StagingFlags::ORDER {
            self.run_phase(stage);
        }
        self.finish_tick()
    }

    /// Initialize on the first tick. Returns `false` once the voice is finished.
    ///
    /// [`prepare`](Self::prepare), [`run_phase`](Self::run_phase) for every
    /// stage and [`finish_tick`](Self::finish_tick) make up one tick, so a
    /// caller driving several voices can run each stage across all of them.
    pub fn prepare(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            VoiceState::Finished => false,
            VoiceState::Running => true,
            VoiceState::Pending => {
                if let Err(e) = self.init(&mut inner) {
                    warn!(target: "recall", "voice {} failed to initialize: {e}", self.recall_id.id());
                    self.end(&mut inner);
                    return false;
                }
                inner.state = VoiceState::Running;
                true
            }
        }
    }

    /// Run `stage` on every live recall of the voice.
    pub fn run_phase(&self, stage: StagingFlags) {
        let inner = self.inner.lock();
        if inner.state != VoiceState::Running {
            return;
        }
        let scope = self.scope();
        // Children spawned by an earlier stage join the later ones.
        for recall in live(&inner.instances) {
            self.run_stage(&recall, scope, stage);
        }
    }

    /// Clean up finished recalls and end the voice once every
    /// non-persistent recall is gone.
    pub fn finish_tick(&self) -> VoiceState {
        let mut inner = self.inner.lock();
        if inner.state != VoiceState::Running {
            return inner.state;
        }
        let scope = self.scope();
        for recall in inner.instances.clone() {
            cleanup_finishing(&recall, scope);
        }
        inner.ticks += 1;

        let mut non_persistent = inner.instances.iter().filter(|r| !r.is_persistent()).peekable();
        let all_done = non_persistent.peek().is_some()
            && non_persistent.all(|r| r.stage() == RecallStage::CleanedUp);
        if all_done {
            debug!(target: "recall", "voice {} done after {} ticks", self.recall_id.id(), inner.ticks);
            self.end(&mut inner);
        }
        inner.state
    }

    /// Cancel every recall and end the voice.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        if inner.state == VoiceState::Finished {
            return;
        }
        debug!(target: "recall", "cancel voice {}", self.recall_id.id());
        self.end(&mut inner);
    }

    // --- Init ---

    fn init(&self, inner: &mut VoiceInner) -> GraphResult<()> {
        inner.bindings = self.bindings()?;
        let scope = self.scope();

        for binding in &inner.bindings {
            binding.audio.add_recall_id(binding.recall_id.clone());
            for channel in &binding.channels {
                channel.add_recall_id(binding.recall_id.clone());
            }

            let templates = binding
                .audio
                .recalls(binding.list)
                .into_iter()
                .chain(binding.channels.iter().flat_map(|c| c.recalls(binding.list)));
            for template in templates {
                if !template.is_template() || !template.kind().is_run() || !template.scopes().contains(scope) {
                    continue;
                }
                let instance = template.duplicate(&binding.recall_id);
                match instance.provider() {
                    Provider::Channel(c) => {
                        if let Some(c) = c.upgrade() {
                            c.add_recall(binding.list, instance.clone());
                        }
                    }
                    _ => binding.audio.add_recall(binding.list, instance.clone()),
                }
                if let Some(container) = instance.container() {
                    container.add_instance(instance.clone());
                }
                inner.instances.push(instance);
            }
        }

        for instance in &inner.instances {
            resolve(instance);
            instance.set_stage(RecallStage::Resolved);
        }
        self.recall_id.set_initialized();
        debug!(
            target: "recall",
            "voice {} on {} ({}): {} recalls in {} audios",
            self.recall_id.id(),
            self.channel.name(),
            scope.name(),
            inner.instances.len(),
            inner.bindings.len()
        );
        Ok(())
    }

    /// Audios and channels this voice reaches.
    ///
    /// The starting audio uses its play lists. Every input linked to an
    /// upstream output adds that audio with its recall lists under a
    /// nested recall id.
    fn bindings(&self) -> GraphResult<Vec<Binding>> {
        let mut out = Vec::new();
        let mut pending = vec![(self.channel.clone(), self.recall_id.clone(), RecallList::Play)];
        while let Some((channel, recall_id, list)) = pending.pop() {
            let Some(audio) = channel.audio() else {
                continue;
            };
            let mut channels = vec![channel.clone()];
            if channel.direction() == Direction::Output {
                channels.extend(channel.mapped());
            }
            for input in channels.iter().filter(|c| c.direction() == Direction::Input) {
                if let Some(upstream) = input.link() {
                    let nested = recall_id.nested(upstream.recyclings())?;
                    pending.push((upstream, nested, RecallList::Recall));
                }
            }
            out.push(Binding {
                audio,
                channels,
                list,
                recall_id,
            });
        }
        Ok(out)
    }

    // --- Stages ---

    fn run_stage(&self, recall: &Arc<Recall>, scope: SoundScope, stage: StagingFlags) {
        if recall.stage().is_over() {
            return;
        }
        if stage == StagingFlags::RESET {
            recall.reset_staging(scope);
            return;
        }
        if !recall.try_advance(scope, stage) {
            return;
        }

        let lifecycle = recall.stage();
        if StagingFlags::INIT.contains(stage) {
            if lifecycle < RecallStage::RunInit {
                recall.set_stage(RecallStage::RunInit);
            }
        } else if lifecycle < RecallStage::Running {
            recall.set_stage(RecallStage::Running);
        }

        let Some(recall_id) = recall.recall_id() else {
            return;
        };
        let Some(mut handler) = recall.take_handler() else {
            return;
        };
        trace!(target: "recall", "{} {} {}", recall.effect(), recall.id(), stage.name());
        let mut ctx = RunContext::new(recall.clone(), recall_id, scope, stage);
        handler.run_stage(stage, &mut ctx);
        if ctx.is_done_requested() {
            recall.set_stage(RecallStage::Done);
            handler.done(&mut ctx);
        } else if stage == StagingFlags::RUN_INIT_POST {
            recall.set_stage(RecallStage::Running);
        }
        recall.put_handler(handler);
    }

    // --- End ---

    /// Cancel what still runs, release the voice's signals and forget it.
    fn end(&self, inner: &mut VoiceInner) {
        let scope = self.scope();
        for recall in inner.instances.clone() {
            cancel(&recall, scope);
            cleanup_finishing(&recall, scope);
        }

        for recall_id in self.recall_id.subtree() {
            for recycling in recall_id.context().recyclings() {
                recycling.release_voice(recall_id.id());
            }
        }
        for binding in &inner.bindings {
            for channel in &binding.channels {
                for recycling in channel.recyclings() {
                    recycling.release_voice(binding.recall_id.id());
                }
                channel.remove_recall_id(binding.recall_id.id());
            }
            binding.audio.remove_recall_id(binding.recall_id.id());
            binding.audio.reap_retired();
        }
        self.channel.playback().clear(scope, self.recall_id.id());
        self.recall_id.set_finished();
        self.recall_id.teardown();
        inner.bindings.clear();
        inner.state = VoiceState::Finished;
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("channel", &self.channel.name())
            .field("recall_id", &self.recall_id.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Recalls still taking part, each followed by its children.
fn live(instances: &[Arc<Recall>]) -> Vec<Arc<Recall>> {
    fn push(recall: &Arc<Recall>, out: &mut Vec<Arc<Recall>>) {
        if recall.stage().is_over() {
            return;
        }
        out.push(recall.clone());
        for child in recall.children() {
            push(&child, out);
        }
    }
    let mut out = Vec::with_capacity(instances.len());
    for recall in instances {
        push(recall, &mut out);
    }
    out
}

/// Resolve the dependencies of `recall` in its audio.
///
/// Audio and channel templates are found by provider; run instances must
/// share the recall's recycling context. A miss leaves `None`.
fn resolve(recall: &Arc<Recall>) {
    let Some(audio) = recall.audio() else {
        return;
    };
    let context_id = recall.recall_id().map(|r| r.context().id());
    let channel_id = recall.provider().channel_id();

    let resolved = recall
        .dependencies()
        .iter()
        .map(|dep| {
            let container = audio
                .find_container(&dep.effect, recall.list())
                .or_else(|| audio.containers().into_iter().find(|c| c.effect() == dep.effect));
            let found = container.and_then(|c| match dep.kind {
                RecallKind::Audio => c.template(RecallKind::Audio, None),
                RecallKind::Channel => c.template(RecallKind::Channel, channel_id),
                RecallKind::AudioRun => context_id.and_then(|ctx| c.instance(RecallKind::AudioRun, ctx, None)),
                RecallKind::ChannelRun => {
                    context_id.and_then(|ctx| c.instance(RecallKind::ChannelRun, ctx, channel_id))
                }
                _ => None,
            });
            if found.is_none() {
                warn!(
                    target: "recall",
                    "{} {}: unresolved dependency {} ({:?})",
                    recall.effect(),
                    recall.id(),
                    dep.effect,
                    dep.kind
                );
            }
            found.map(|r| Arc::downgrade(&r))
        })
        .collect::<Vec<Option<Weak<Recall>>>>();
    recall.set_resolved(resolved);
}

fn context(recall: &Arc<Recall>, scope: SoundScope) -> Option<RunContext> {
    let recall_id = recall.recall_id()?;
    Some(RunContext::new(recall.clone(), recall_id, scope, StagingFlags::NONE))
}

/// Cancel `recall` and its children unless they are already over.
fn cancel(recall: &Arc<Recall>, scope: SoundScope) {
    for child in recall.children() {
        cancel(&child, scope);
    }
    if recall.stage().is_over() {
        return;
    }
    recall.set_stage(RecallStage::Cancelled);
    if let (Some(mut handler), Some(mut ctx)) = (recall.take_handler(), context(recall, scope)) {
        handler.cancel(&mut ctx);
        recall.put_handler(handler);
    }
}

/// Clean up finished children of `recall`, then `recall` itself if it is
/// finished. A parent's leftover children are cancelled first.
fn cleanup_finishing(recall: &Arc<Recall>, scope: SoundScope) {
    for child in recall.children() {
        cleanup_finishing(&child, scope);
    }
    if !recall.stage().is_finishing() {
        return;
    }
    for child in recall.children() {
        cancel(&child, scope);
        cleanup_finishing(&child, scope);
    }

    if let Some(mut handler) = recall.take_handler() {
        if let Some(mut ctx) = context(recall, scope) {
            handler.cleanup(&mut ctx);
        }
        recall.put_handler(handler);
    }
    recall.set_stage(RecallStage::CleanedUp);

    if let Some(parent) = recall.parent() {
        parent.remove_child(recall.id());
    } else {
        match recall.provider() {
            Provider::Channel(c) => {
                if let Some(c) = c.upgrade() {
                    c.remove_recall(recall.id());
                }
            }
            _ => {
                if let Some(a) = recall.audio() {
                    a.remove_recall(recall.id());
                }
            }
        }
    }
    if let Some(container) = recall.container() {
        container.remove_instance(recall.id());
    }
    trace!(target: "recall", "cleaned up {} {}", recall.effect(), recall.id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tw_ir::Presets;

    use crate::audio::flags;
    use crate::recall::{RecallContainer, RecallHandler};
    use crate::recall_id::RecyclingContext;

    /// Counts `run_pre` calls and is done after `ticks` of them.
    struct Counter {
        calls: Arc<AtomicUsize>,
        ticks: usize,
    }

    impl RecallHandler for Counter {
        fn duplicate(&self) -> Box<dyn RecallHandler> {
            Box::new(Counter {
                calls: self.calls.clone(),
                ticks: self.ticks,
            })
        }

        fn run_pre(&mut self, ctx: &mut RunContext) {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if calls >= self.ticks {
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

    struct Fixture {
        _audio: Arc<Audio>,
        output: Arc<Channel>,
        container: Arc<RecallContainer>,
        calls: Arc<AtomicUsize>,
    }

    fn counting_output(ticks: usize) -> Fixture {
        let audio = Audio::new("counter", flags::OUTPUT_HAS_RECYCLING, &Presets::default());
        audio.resize(1, 1, 0).unwrap();
        let output = audio.channel(Direction::Output, 0).unwrap();
        let container = RecallContainer::new(&audio, "count", RecallList::Play, Vec::new());
        audio.add_container(container.clone());

        let calls = Arc::new(AtomicUsize::new(0));
        let handler = Counter {
            calls: calls.clone(),
            ticks,
        };
        let template = Arc::new(
            Recall::new("count", RecallKind::ChannelRun, Provider::channel(&output), Box::new(handler))
                .with_container(&container),
        );
        container.add_template(template.clone());
        output.add_recall(RecallList::Play, template);
        Fixture {
            _audio: audio,
            output,
            container,
            calls,
        }
    }

    fn voice(channel: &Arc<Channel>) -> Arc<Voice> {
        let context = RecyclingContext::new(SoundScope::Playback, channel.recyclings());
        Voice::new(channel.clone(), RecallId::new(context))
    }

    #[test]
    fn stage_runs_once_per_tick() {
        let f = counting_output(10);
        let v = voice(&f.output);
        assert!(v.prepare());
        v.run_phase(StagingFlags::RESET);
        v.run_phase(StagingFlags::RUN_PRE);
        // Second path to the same recall within the tick
        v.run_phase(StagingFlags::RUN_PRE);
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
        v.finish_tick();

        v.tick();
        assert_eq!(f.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn round_trip_empties_the_container() {
        let f = counting_output(3);
        let v = voice(&f.output);
        let mut ticks = 0;
        while v.tick() != VoiceState::Finished && ticks < 10 {
            ticks += 1;
            assert_eq!(f.container.instances().len(), if v.is_finished() { 0 } else { 1 });
        }
        assert!(v.is_finished());
        assert_eq!(f.calls.load(Ordering::SeqCst), 3);
        assert!(f.container.instances().is_empty());
        assert_eq!(f.output.recalls(RecallList::Play).len(), 1);
        assert!(f.output.recall_ids().is_empty());
        assert!(v.recall_id().is_finished());
    }

    #[test]
    fn cancel_ends_a_running_voice() {
        let f = counting_output(100);
        let v = voice(&f.output);
        v.tick();
        assert_eq!(v.state(), VoiceState::Running);
        v.cancel();
        assert!(v.is_finished());
        assert!(v.instances().iter().all(|r| r.stage() == RecallStage::CleanedUp));
        assert!(f.container.instances().is_empty());
        assert!(!v.prepare());
    }
}
