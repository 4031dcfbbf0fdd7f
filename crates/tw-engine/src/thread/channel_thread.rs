use std::sync::{Arc, OnceLock, Weak};

use log::debug;
use tw_thread::{Thread, ThreadResult, ThreadRun};

use crate::recall::{Voice, VoiceState};

/// Runs one voice on a thread of its own and stops once the voice is done.
pub struct ChannelThread {
    voice: Arc<Voice>,
    node: Arc<OnceLock<Weak<Thread>>>,
}

impl ChannelThread {
    /// Create the tree node for `voice`. The caller attaches it.
    pub fn spawn(voice: Arc<Voice>, frequency: f64) -> Arc<Thread> {
        let node = Arc::new(OnceLock::new());
        let name = format!("channel-{}-{}", voice.channel().name(), voice.scope().name());
        let thread = Thread::new(
            name,
            frequency,
            ChannelThread {
                voice,
                node: node.clone(),
            },
        );
        let _ = node.set(Arc::downgrade(&thread));
        thread
    }

    fn stop_node(&self) {
        if let Some(thread) = self.node.get().and_then(Weak::upgrade) {
            thread.request_stop();
        }
    }
}

impl ThreadRun for ChannelThread {
    fn run(&mut self, _tick: u64) -> ThreadResult<()> {
        if self.voice.tick() == VoiceState::Finished {
            debug!(target: "thread", "voice {} finished on its channel thread", self.voice.recall_id().id());
            self.stop_node();
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.voice.cancel();
    }
}
