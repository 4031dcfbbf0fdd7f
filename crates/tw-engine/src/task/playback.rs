use std::sync::Arc;

use log::{debug, info};
use tw_ir::SoundScope;
use tw_thread::Task;

use super::{send, Reply};
use crate::audio::Audio;
use crate::channel::Channel;
use crate::error::{GraphError, GraphResult};
use crate::recall::Voice;
use crate::recall_id::{RecallId, RecyclingContext};
use crate::thread::AudioLoop;

/// Start a voice on `channel`, or return the one already playing in `scope`.
fn start_voice(channel: &Arc<Channel>, scope: SoundScope, audio_loop: &AudioLoop) -> GraphResult<Arc<Voice>> {
    if let Some(voice) = audio_loop.find_voice(channel.id(), scope) {
        debug!(target: "task", "{} already plays in {}", channel.name(), scope.name());
        return Ok(voice);
    }
    if channel.audio().is_none() {
        return Err(GraphError::AudioDropped);
    }
    let context = RecyclingContext::new(scope, channel.recyclings());
    let recall_id = RecallId::new(context);
    let voice = Voice::new(channel.clone(), recall_id.clone());
    let thread = audio_loop.add_voice(voice.clone());
    debug!(
        target: "task",
        "play {} in {} as voice {}{}",
        channel.name(),
        scope.name(),
        recall_id.id(),
        if thread.is_some() { " on its own thread" } else { "" }
    );
    channel.playback().set(scope, recall_id, thread);
    Ok(voice)
}

fn cancel_voice(channel: &Channel, scope: SoundScope, audio_loop: &AudioLoop) -> bool {
    let thread = channel.playback().thread(scope);
    let voice = audio_loop.find_voice(channel.id(), scope);
    if let Some(voice) = &voice {
        voice.cancel();
        audio_loop.remove_voice(voice);
    }
    if let Some(thread) = thread {
        thread.request_stop();
    }
    voice.is_some()
}

/// Play one channel in one scope.
pub struct StartChannel {
    channel: Arc<Channel>,
    scope: SoundScope,
    audio_loop: Arc<AudioLoop>,
    reply: Reply<GraphResult<Arc<Voice>>>,
}

impl StartChannel {
    pub fn new(channel: Arc<Channel>, scope: SoundScope, audio_loop: Arc<AudioLoop>) -> Self {
        Self {
            channel,
            scope,
            audio_loop,
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: crossbeam_channel::Sender<GraphResult<Arc<Voice>>>) -> Self {
        self.reply = Some(reply);
        self
    }
}

impl Task for StartChannel {
    fn name(&self) -> &str {
        "start-channel"
    }

    fn launch(&mut self) {
        let result = start_voice(&self.channel, self.scope, &self.audio_loop);
        send(&self.reply, result);
    }
}

/// Play every output of an audio in one scope.
pub struct StartAudio {
    audio: Arc<Audio>,
    scope: SoundScope,
    audio_loop: Arc<AudioLoop>,
    reply: Reply<GraphResult<Vec<Arc<Voice>>>>,
}

impl StartAudio {
    pub fn new(audio: Arc<Audio>, scope: SoundScope, audio_loop: Arc<AudioLoop>) -> Self {
        Self {
            audio,
            scope,
            audio_loop,
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: crossbeam_channel::Sender<GraphResult<Vec<Arc<Voice>>>>) -> Self {
        self.reply = Some(reply);
        self
    }
}

impl Task for StartAudio {
    fn name(&self) -> &str {
        "start-audio"
    }

    fn launch(&mut self) {
        self.audio_loop.add_domain(self.audio.domain().clone());
        let result = self
            .audio
            .outputs()
            .iter()
            .map(|output| start_voice(output, self.scope, &self.audio_loop))
            .collect::<GraphResult<Vec<_>>>();
        if let Ok(voices) = &result {
            info!(target: "task", "play {} in {}: {} voices", self.audio.name(), self.scope.name(), voices.len());
        }
        send(&self.reply, result);
    }
}

/// Stop the voice playing on a channel in one scope.
pub struct CancelChannel {
    channel: Arc<Channel>,
    scope: SoundScope,
    audio_loop: Arc<AudioLoop>,
}

impl CancelChannel {
    pub fn new(channel: Arc<Channel>, scope: SoundScope, audio_loop: Arc<AudioLoop>) -> Self {
        Self {
            channel,
            scope,
            audio_loop,
        }
    }
}

impl Task for CancelChannel {
    fn name(&self) -> &str {
        "cancel-channel"
    }

    fn launch(&mut self) {
        if !cancel_voice(&self.channel, self.scope, &self.audio_loop) {
            debug!(target: "task", "{} does not play in {}", self.channel.name(), self.scope.name());
        }
    }
}

/// Stop every voice of an audio in one scope.
pub struct CancelAudio {
    audio: Arc<Audio>,
    scope: SoundScope,
    audio_loop: Arc<AudioLoop>,
}

impl CancelAudio {
    pub fn new(audio: Arc<Audio>, scope: SoundScope, audio_loop: Arc<AudioLoop>) -> Self {
        Self {
            audio,
            scope,
            audio_loop,
        }
    }
}

impl Task for CancelAudio {
    fn name(&self) -> &str {
        "cancel-audio"
    }

    fn launch(&mut self) {
        let cancelled = self
            .audio
            .outputs()
            .iter()
            .filter(|output| cancel_voice(output, self.scope, &self.audio_loop))
            .count();
        if !self.audio.domain().is_playing(self.scope) {
            self.audio_loop.remove_domain(self.audio.id());
        }
        info!(target: "task", "stop {} in {}: {cancelled} voices", self.audio.name(), self.scope.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::flags;
    use crate::channel::Direction;
    use tw_ir::Presets;

    fn audio() -> Arc<Audio> {
        let a = Audio::new("a", flags::OUTPUT_HAS_RECYCLING, &Presets::default());
        a.resize(1, 2, 0).unwrap();
        a
    }

    #[test]
    fn start_creates_one_context_per_channel() {
        let a = audio();
        let audio_loop = AudioLoop::new(false);
        let output = a.channel(Direction::Output, 0).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        StartChannel::new(output.clone(), SoundScope::Playback, audio_loop.clone())
            .with_reply(tx.clone())
            .launch();
        let voice = rx.recv().unwrap().unwrap();
        let recall_id = output.playback().recall_id(SoundScope::Playback).unwrap();
        assert_eq!(recall_id.id(), voice.recall_id().id());
        assert!(recall_id.context().is_toplevel());
        assert_eq!(recall_id.context().recyclings().len(), 1);

        // A second start reuses the voice.
        StartChannel::new(output.clone(), SoundScope::Playback, audio_loop.clone())
            .with_reply(tx)
            .launch();
        assert!(Arc::ptr_eq(&rx.recv().unwrap().unwrap(), &voice));
        assert_eq!(audio_loop.voices().len(), 1);
    }

    #[test]
    fn audio_start_and_cancel() {
        let a = audio();
        let audio_loop = AudioLoop::new(false);
        let (tx, rx) = crossbeam_channel::unbounded();
        StartAudio::new(a.clone(), SoundScope::Sequencer, audio_loop.clone())
            .with_reply(tx)
            .launch();
        assert_eq!(rx.recv().unwrap().unwrap().len(), 2);
        assert!(a.domain().is_playing(SoundScope::Sequencer));
        assert_eq!(audio_loop.domains().len(), 1);

        CancelAudio::new(a.clone(), SoundScope::Sequencer, audio_loop.clone()).launch();
        assert!(audio_loop.voices().is_empty());
        assert!(!a.domain().is_playing(SoundScope::Sequencer));
        assert!(audio_loop.domains().is_empty());
        for output in a.outputs() {
            assert!(!output.playback().is_playing(SoundScope::Sequencer));
        }
    }

    #[test]
    fn cancel_of_idle_channel_is_harmless() {
        let a = audio();
        let audio_loop = AudioLoop::new(false);
        let output = a.channel(Direction::Output, 1).unwrap();
        CancelChannel::new(output.clone(), SoundScope::Playback, audio_loop).launch();
        assert!(!output.playback().is_playing(SoundScope::Playback));
    }
}
