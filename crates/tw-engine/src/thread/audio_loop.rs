//! The audio loop: drives every voice that has no thread of its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use log::{debug, trace};
use parking_lot::Mutex;
use tw_ir::{SoundScope, StagingFlags};
use tw_thread::{SyncMode, Thread, ThreadResult, ThreadRun};

use super::channel_thread::ChannelThread;
use crate::playback::PlaybackDomain;
use crate::recall::Voice;

/// Voices and playback domains of the audio loop.
///
/// Shared between the audio loop's runner and the tasks that start and
/// cancel playback. Inline voices are ticked by the loop itself, stage by
/// stage across all of them. Super-threaded voices get a [`ChannelThread`]
/// queued as a pre-sync child of the loop.
pub struct AudioLoop {
    super_threaded: AtomicBool,
    inline: Mutex<Vec<Arc<Voice>>>,
    threaded: Mutex<Vec<Arc<Voice>>>,
    domains: Mutex<Vec<Arc<PlaybackDomain>>>,
    thread: OnceLock<Weak<Thread>>,
}

impl AudioLoop {
    pub fn new(super_threaded: bool) -> Arc<Self> {
        Arc::new(Self {
            super_threaded: AtomicBool::new(super_threaded),
            inline: Mutex::new(Vec::new()),
            threaded: Mutex::new(Vec::new()),
            domains: Mutex::new(Vec::new()),
            thread: OnceLock::new(),
        })
    }

    /// Remember the tree node running this loop. Only the first call counts.
    pub fn bind(&self, thread: &Arc<Thread>) {
        let _ = self.thread.set(Arc::downgrade(thread));
    }

    pub fn thread(&self) -> Option<Arc<Thread>> {
        self.thread.get().and_then(Weak::upgrade)
    }

    pub fn is_super_threaded(&self) -> bool {
        self.super_threaded.load(Ordering::Acquire)
    }

    /// Applies to voices added afterwards.
    pub fn set_super_threaded(&self, super_threaded: bool) {
        self.super_threaded.store(super_threaded, Ordering::Release);
    }

    // --- Voices ---

    /// Hand `voice` to the loop.
    ///
    /// Returns the channel thread when the voice runs super-threaded. The
    /// thread joins the loop's start queue and begins on its next tick.
    pub fn add_voice(&self, voice: Arc<Voice>) -> Option<Arc<Thread>> {
        let parent = self.thread().filter(|_| self.is_super_threaded());
        match parent {
            Some(parent) => {
                let thread = ChannelThread::spawn(voice.clone(), parent.frequency());
                parent.add_start_queue(thread.clone(), SyncMode::PreSync);
                self.threaded.lock().push(voice);
                Some(thread)
            }
            None => {
                self.inline.lock().push(voice);
                None
            }
        }
    }

    /// Every voice the loop knows about, inline ones first.
    pub fn voices(&self) -> Vec<Arc<Voice>> {
        let mut out = self.inline.lock().clone();
        out.extend(self.threaded.lock().iter().cloned());
        out
    }

    pub fn inline_count(&self) -> usize {
        self.inline.lock().len()
    }

    /// The running voice started on channel `channel_id` in `scope`.
    pub fn find_voice(&self, channel_id: u64, scope: SoundScope) -> Option<Arc<Voice>> {
        self.voices()
            .into_iter()
            .find(|v| v.channel().id() == channel_id && v.scope() == scope && !v.is_finished())
    }

    pub fn remove_voice(&self, voice: &Arc<Voice>) {
        self.inline.lock().retain(|v| !Arc::ptr_eq(v, voice));
        self.threaded.lock().retain(|v| !Arc::ptr_eq(v, voice));
    }

    // --- Domains ---

    pub fn add_domain(&self, domain: Arc<PlaybackDomain>) {
        let mut domains = self.domains.lock();
        if !domains.iter().any(|d| d.audio_id() == domain.audio_id()) {
            domains.push(domain);
        }
    }

    pub fn remove_domain(&self, audio_id: u64) {
        self.domains.lock().retain(|d| d.audio_id() != audio_id);
    }

    pub fn domains(&self) -> Vec<Arc<PlaybackDomain>> {
        self.domains.lock().clone()
    }

    // --- Tick ---

    /// Run one tick of every inline voice and forget finished voices.
    ///
    /// Each stage completes across all voices before the next one starts.
    /// Returns the number of inline voices still running.
    pub fn run_voices(&self) -> usize {
        let voices = self.inline.lock().clone();
        let running: Vec<&Arc<Voice>> = voices.iter().filter(|v| v.prepare()).collect();
        for stage in StagingFlags::ORDER {
            for voice in &running {
                voice.run_phase(stage);
            }
        }
        for voice in &running {
            voice.finish_tick();
        }

        let mut inline = self.inline.lock();
        inline.retain(|v| !v.is_finished());
        self.threaded.lock().retain(|v| !v.is_finished());
        trace!(target: "thread", "audio loop: {} inline voices", inline.len());
        inline.len()
    }

    /// Cancel every voice.
    pub fn cancel_all(&self) {
        let voices = self.voices();
        if !voices.is_empty() {
            debug!(target: "thread", "audio loop cancels {} voices", voices.len());
        }
        for voice in voices {
            voice.cancel();
        }
        self.inline.lock().clear();
        self.threaded.lock().clear();
    }
}

/// Tree runner of the [`AudioLoop`].
pub struct AudioLoopRun(pub Arc<AudioLoop>);

impl ThreadRun for AudioLoopRun {
    fn run(&mut self, _tick: u64) -> ThreadResult<()> {
        self.0.run_voices();
        Ok(())
    }

    fn stop(&mut self) {
        self.0.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{flags, Audio};
    use crate::channel::{Channel, Direction};
    use crate::recall::{RecallFactory, Target, VoiceState};
    use crate::recall_id::{RecallId, RecyclingContext};
    use crate::signal::AudioSignal;
    use tw_ir::Presets;

    fn streaming_output(buffers: usize) -> (Arc<Audio>, Arc<Channel>) {
        let presets = Presets::default();
        let audio = Audio::new("src", flags::OUTPUT_HAS_RECYCLING, &presets);
        audio.resize(1, 1, 0).unwrap();
        RecallFactory::create(&audio, "stream", Target::outputs(&audio), RecallFactory::PLAY).unwrap();
        let output = audio.channel(Direction::Output, 0).unwrap();
        let samples = vec![0.25; buffers * presets.buffer_size as usize];
        output
            .own_recycling()
            .unwrap()
            .set_template(Arc::new(AudioSignal::template_from_samples(&presets, &samples)));
        (audio, output)
    }

    fn voice_on(channel: &Arc<Channel>) -> Arc<Voice> {
        let context = RecyclingContext::new(SoundScope::Playback, channel.recyclings());
        Voice::new(channel.clone(), RecallId::new(context))
    }

    #[test]
    fn inline_voice_runs_until_done() {
        let (_audio, output) = streaming_output(3);
        let audio_loop = AudioLoop::new(false);
        let voice = voice_on(&output);
        assert!(audio_loop.add_voice(voice.clone()).is_none());

        let mut ticks = 0;
        while audio_loop.run_voices() > 0 && ticks < 20 {
            ticks += 1;
        }
        assert_eq!(voice.state(), VoiceState::Finished);
        assert!(ticks >= 2);
        assert!(audio_loop.voices().is_empty());
        assert!(!output.has_live_signals());
    }

    #[test]
    fn super_threaded_without_a_node_stays_inline() {
        let (_audio, output) = streaming_output(1);
        let audio_loop = AudioLoop::new(true);
        assert!(audio_loop.add_voice(voice_on(&output)).is_none());
        assert_eq!(audio_loop.inline_count(), 1);
    }

    #[test]
    fn super_threaded_voice_is_queued() {
        let (_audio, output) = streaming_output(1);
        let audio_loop = AudioLoop::new(true);
        let node = Thread::new("audio-loop", 100.0, AudioLoopRun(audio_loop.clone()));
        audio_loop.bind(&node);

        let thread = audio_loop.add_voice(voice_on(&output)).unwrap();
        assert!(node.is_queued(&thread));
        assert_eq!(audio_loop.inline_count(), 0);
        assert!(audio_loop.find_voice(output.id(), SoundScope::Playback).is_some());
        assert!(audio_loop.find_voice(output.id(), SoundScope::Sequencer).is_none());
    }

    #[test]
    fn cancel_all_releases_voices() {
        let (_audio, output) = streaming_output(8);
        let audio_loop = AudioLoop::new(false);
        let voice = voice_on(&output);
        audio_loop.add_voice(voice.clone());
        audio_loop.run_voices();
        assert!(output.has_live_signals());

        audio_loop.cancel_all();
        assert!(voice.is_finished());
        assert!(!output.has_live_signals());
    }

    #[test]
    fn domains_are_unique_per_audio() {
        let audio = Audio::new("a", 0, &Presets::default());
        let audio_loop = AudioLoop::new(false);
        audio_loop.add_domain(audio.domain().clone());
        audio_loop.add_domain(audio.domain().clone());
        assert_eq!(audio_loop.domains().len(), 1);
        audio_loop.remove_domain(audio.id());
        assert!(audio_loop.domains().is_empty());
    }
}
