use std::any::Any;
use std::sync::Arc;

use tw_audio::SharedSoundcard;
use tw_ir::{PortValue, SoundScope, StagingFlags};

use crate::audio::Audio;
use crate::channel::Channel;
use crate::recall::{Provider, Recall};
use crate::recall_id::RecallId;
use crate::recycling::Recycling;

/// Tempo changes reach recalls through this trait.
pub trait TempoAware {
    fn bpm(&self) -> f64;
    fn set_bpm(&mut self, bpm: f64);
}

/// Behaviour of a recall. Every stage defaults to doing nothing.
///
/// The driver takes the handler out of its recall while a stage runs, so a
/// handler may freely lock its own recall and read its dependencies.
pub trait RecallHandler: Send + Any {
    /// A fresh handler for a per-voice instance. Copies configuration,
    /// never run state.
    fn duplicate(&self) -> Box<dyn RecallHandler>;

    // --- Init stages, once per voice ---

    fn run_init_pre(&mut self, _ctx: &mut RunContext) {}
    fn run_init_inter(&mut self, _ctx: &mut RunContext) {}
    fn run_init_post(&mut self, _ctx: &mut RunContext) {}

    // --- Per tick stages ---

    fn feed_input_queue(&mut self, _ctx: &mut RunContext) {}
    fn automate(&mut self, _ctx: &mut RunContext) {}
    fn run_pre(&mut self, _ctx: &mut RunContext) {}
    fn run_inter(&mut self, _ctx: &mut RunContext) {}
    fn run_post(&mut self, _ctx: &mut RunContext) {}
    fn do_feedback(&mut self, _ctx: &mut RunContext) {}
    fn feed_output_queue(&mut self, _ctx: &mut RunContext) {}

    /// Dispatch one stage.
    fn run_stage(&mut self, stage: StagingFlags, ctx: &mut RunContext) {
        match stage {
            StagingFlags::RUN_INIT_PRE => self.run_init_pre(ctx),
            StagingFlags::RUN_INIT_INTER => self.run_init_inter(ctx),
            StagingFlags::RUN_INIT_POST => self.run_init_post(ctx),
            StagingFlags::FEED_INPUT_QUEUE => self.feed_input_queue(ctx),
            StagingFlags::AUTOMATE => self.automate(ctx),
            StagingFlags::RUN_PRE => self.run_pre(ctx),
            StagingFlags::RUN_INTER => self.run_inter(ctx),
            StagingFlags::RUN_POST => self.run_post(ctx),
            StagingFlags::DO_FEEDBACK => self.do_feedback(ctx),
            StagingFlags::FEED_OUTPUT_QUEUE => self.feed_output_queue(ctx),
            _ => {}
        }
    }

    // --- End of life ---

    /// The recall finished on its own.
    fn done(&mut self, _ctx: &mut RunContext) {}

    /// The recall was stopped from outside.
    fn cancel(&mut self, _ctx: &mut RunContext) {}

    /// Release what the recall created. Called exactly once.
    fn cleanup(&mut self, _ctx: &mut RunContext) {}

    fn tempo_aware(&mut self) -> Option<&mut dyn TempoAware> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// What a handler sees while one of its stages runs.
pub struct RunContext {
    recall: Arc<Recall>,
    recall_id: Arc<RecallId>,
    scope: SoundScope,
    stage: StagingFlags,
    done: bool,
}

impl RunContext {
    pub(crate) fn new(recall: Arc<Recall>, recall_id: Arc<RecallId>, scope: SoundScope, stage: StagingFlags) -> Self {
        Self {
            recall,
            recall_id,
            scope,
            stage,
            done: false,
        }
    }

    pub fn recall(&self) -> &Arc<Recall> {
        &self.recall
    }

    pub fn recall_id(&self) -> &Arc<RecallId> {
        &self.recall_id
    }

    pub fn scope(&self) -> SoundScope {
        self.scope
    }

    pub fn stage(&self) -> StagingFlags {
        self.stage
    }

    pub fn channel(&self) -> Option<Arc<Channel>> {
        self.recall.channel()
    }

    pub fn audio(&self) -> Option<Arc<Audio>> {
        self.recall.audio()
    }

    /// Recyclings of the recall's channel.
    pub fn recyclings(&self) -> Vec<Arc<Recycling>> {
        self.channel().map(|c| c.recyclings()).unwrap_or_default()
    }

    pub fn soundcard(&self) -> Option<SharedSoundcard> {
        self.audio().and_then(|a| a.soundcard())
    }

    pub fn dependency(&self, effect: &str) -> Option<Arc<Recall>> {
        self.recall.dependency(effect)
    }

    pub fn port(&self, name: &str) -> Option<PortValue> {
        self.recall.port_value(name)
    }

    pub fn port_f64(&self, name: &str, default: f64) -> f64 {
        self.port(name).map(PortValue::as_f64).unwrap_or(default)
    }

    /// Finish the recall after this stage.
    pub fn request_done(&mut self) {
        self.done = true;
    }

    pub fn is_done_requested(&self) -> bool {
        self.done
    }

    /// Attach a child recall that runs after its parent in every stage.
    pub fn spawn_child(&mut self, effect: &str, provider: Provider, handler: Box<dyn RecallHandler>) -> Arc<Recall> {
        Recall::child_of(&self.recall, effect, provider, handler)
    }
}
