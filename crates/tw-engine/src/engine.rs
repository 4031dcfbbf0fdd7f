//! The engine context: thread tree, task queue, audio loop and devices.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver};
use log::{info, warn};
use parking_lot::Mutex;
use tw_audio::{SharedSequencer, SharedSoundcard};
use tw_ir::{Presets, SoundScope, DEFAULT_BPM, DEFAULT_DELAY_FACTOR};
use tw_thread::{SyncMode, Task, TaskQueue, Thread, ThreadTree, TreeConfig};

use crate::audio::Audio;
use crate::channel::Channel;
use crate::error::{EngineError, EngineResult, GraphResult};
use crate::recall::Voice;
use crate::registry::{AudioKey, AudioRegistry};
use crate::task::{
    AddAudio, ApplyBpm, ApplyPresets, BpmReport, CancelAudio, CancelChannel, LinkChannel, RemoveAudio, ResizeAudio,
    StartAudio, StartChannel, UnlinkChannel,
};
use crate::thread::{
    AudioLoop, AudioLoopRun, ExportHandle, ExportSink, ExportThread, MainLoop, MidiLoop, SequencerThread,
    SoundcardThread,
};

/// Who launches queued tasks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskMode {
    /// A dedicated task thread.
    #[default]
    Worker,
    /// The main loop, at the start of every tick.
    Inline,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub tree: TreeConfig,
    /// Added to the soundcard's buffer rate to get the tick frequency.
    pub overclock: f64,
    pub super_threaded_channels: bool,
    pub task_mode: TaskMode,
    pub bpm: f64,
    pub delay_factor: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tree: TreeConfig::default(),
            overclock: 0.0,
            super_threaded_channels: false,
            task_mode: TaskMode::Worker,
            bpm: DEFAULT_BPM,
            delay_factor: DEFAULT_DELAY_FACTOR,
        }
    }
}

struct Device<T> {
    device: T,
    thread: Arc<Thread>,
}

/// Everything one running engine owns.
///
/// Built with [`init`](Self::init) around a default soundcard. The tree
/// looks like this:
///
/// ```text
/// main-loop ─┬─ audio-loop ─┬─ channel threads
///            │              └─ soundcard threads ── export threads
///            └─ midi-loop ─── sequencer threads
/// ```
///
/// Mutations go through [`append`](Self::append) or the task helpers, which
/// return a receiver for fallible tasks.
pub struct EngineContext {
    config: EngineConfig,
    tree: ThreadTree,
    tasks: Arc<TaskQueue>,
    audio_loop: Arc<AudioLoop>,
    audio_thread: Arc<Thread>,
    midi_thread: Arc<Thread>,
    registry: Arc<AudioRegistry>,
    soundcards: Mutex<Vec<Device<SharedSoundcard>>>,
    sequencers: Mutex<Vec<Device<SharedSequencer>>>,
    exports: Mutex<Vec<ExportHandle>>,
}

impl EngineContext {
    pub fn init(config: EngineConfig, soundcard: SharedSoundcard) -> EngineResult<Self> {
        let presets = {
            let mut card = soundcard.lock();
            card.set_bpm(config.bpm);
            card.set_delay_factor(config.delay_factor);
            card.presets()
        };
        if !presets.is_valid() {
            return Err(EngineError::Audio(tw_audio::AudioError::InvalidPresets(format!("{presets:?}"))));
        }
        let frequency = presets.frequency(config.overclock);

        let main = MainLoop::new();
        let inline_slot = main.inline_slot();
        let tree = ThreadTree::new(config.tree.clone(), frequency, main);
        let tasks = TaskQueue::new(tree.lock_handle());
        if config.task_mode == TaskMode::Inline {
            let _ = inline_slot.set(tasks.clone());
        }

        let audio_loop = AudioLoop::new(config.super_threaded_channels);
        let audio_thread = Thread::new("audio-loop", frequency, AudioLoopRun(audio_loop.clone()));
        audio_loop.bind(&audio_thread);
        tree.root().add_child(audio_thread.clone(), SyncMode::PostSync);

        let midi_thread = Thread::new("midi-loop", frequency, MidiLoop);
        tree.root().add_child(midi_thread.clone(), SyncMode::PostSync);

        let engine = Self {
            config,
            tree,
            tasks,
            audio_loop,
            audio_thread,
            midi_thread,
            registry: AudioRegistry::new(),
            soundcards: Mutex::new(Vec::new()),
            sequencers: Mutex::new(Vec::new()),
            exports: Mutex::new(Vec::new()),
        };
        engine.add_soundcard(soundcard);
        info!(
            target: "thread",
            "engine at {frequency:.1} Hz ({:?}, tasks {:?}{})",
            engine.tree.mode(),
            engine.config.task_mode,
            if engine.config.super_threaded_channels { ", super-threaded channels" } else { "" }
        );
        Ok(engine)
    }

    // --- Accessors ---

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tree(&self) -> &ThreadTree {
        &self.tree
    }

    pub fn tasks(&self) -> &Arc<TaskQueue> {
        &self.tasks
    }

    pub fn audio_loop(&self) -> &Arc<AudioLoop> {
        &self.audio_loop
    }

    pub fn audio_thread(&self) -> &Arc<Thread> {
        &self.audio_thread
    }

    pub fn registry(&self) -> &Arc<AudioRegistry> {
        &self.registry
    }

    /// The soundcard the engine was built around.
    pub fn soundcard(&self) -> Option<SharedSoundcard> {
        self.soundcards.lock().first().map(|d| d.device.clone())
    }

    pub fn soundcards(&self) -> Vec<SharedSoundcard> {
        self.soundcards.lock().iter().map(|d| d.device.clone()).collect()
    }

    pub fn sequencers(&self) -> Vec<SharedSequencer> {
        self.sequencers.lock().iter().map(|d| d.device.clone()).collect()
    }

    pub fn exports(&self) -> Vec<ExportHandle> {
        self.exports.lock().clone()
    }

    /// Tick frequency derived from the default soundcard.
    pub fn frequency(&self) -> f64 {
        self.tree.root().frequency()
    }

    // --- Devices ---

    fn attach(&self, parent: &Arc<Thread>, child: Arc<Thread>, sync: SyncMode) {
        if self.tree.root().is_running() {
            parent.add_start_queue(child, sync);
        } else {
            parent.add_child(child, sync);
        }
    }

    /// Drive `soundcard` from the audio loop. Returns its thread.
    pub fn add_soundcard(&self, soundcard: SharedSoundcard) -> Arc<Thread> {
        let runner = SoundcardThread::new(soundcard.clone());
        let thread = Thread::new(format!("soundcard-{}", runner.name()), self.frequency(), runner);
        self.attach(&self.audio_thread, thread.clone(), SyncMode::PostSync);
        self.soundcards.lock().push(Device {
            device: soundcard,
            thread: thread.clone(),
        });
        thread
    }

    /// Drive `sequencer` from the MIDI loop. Returns its thread.
    pub fn add_sequencer(&self, sequencer: SharedSequencer) -> Arc<Thread> {
        let name = format!("sequencer-{}", sequencer.lock().name());
        let thread = Thread::new(name, self.frequency(), SequencerThread::new(sequencer.clone()));
        self.attach(&self.midi_thread, thread.clone(), SyncMode::PreSync);
        self.sequencers.lock().push(Device {
            device: sequencer,
            thread: thread.clone(),
        });
        thread
    }

    /// Export what the default soundcard plays, `budget` buffers at most.
    pub fn add_export(&self, sink: Box<dyn ExportSink>, budget: Option<u64>) -> EngineResult<ExportHandle> {
        let (card, parent) = {
            let cards = self.soundcards.lock();
            let first = cards.first().ok_or(EngineError::NotInitialized)?;
            (first.device.clone(), first.thread.clone())
        };
        let (thread, handle) = ExportThread::new(card, sink, budget).spawn(parent.frequency());
        self.attach(&parent, thread, SyncMode::PostSync);
        self.exports.lock().push(handle.clone());
        Ok(handle)
    }

    // --- Run ---

    /// Start the task worker (unless tasks run inline) and the tree.
    pub fn start(&self) -> EngineResult<()> {
        if self.config.task_mode == TaskMode::Worker && !self.tasks.is_worker_running() {
            self.tasks.spawn_worker(self.config.tree.start_timeout)?;
        }
        self.tree.start()?;
        Ok(())
    }

    /// Start without a main loop thread; the caller ticks with [`step`](Self::step).
    pub fn start_stepped(&self) -> EngineResult<()> {
        if self.config.task_mode == TaskMode::Worker && !self.tasks.is_worker_running() {
            self.tasks.spawn_worker(self.config.tree.start_timeout)?;
        }
        self.tree.start_stepped()?;
        Ok(())
    }

    /// Run one main loop tick. Returns `false` once the tree stopped.
    pub fn step(&self) -> EngineResult<bool> {
        Ok(self.tree.step()?)
    }

    /// Run pending tasks on the calling thread.
    pub fn flush_tasks(&self) -> usize {
        self.tasks.run_pending()
    }

    /// Stop every thread, cancel every voice and stop the task worker.
    pub fn teardown(&self) {
        self.tree.stop();
        self.tasks.shutdown();
        self.audio_loop.cancel_all();
        for export in self.exports() {
            if !export.is_finished() {
                warn!(target: "export", "export was not finalized");
            }
        }
        info!(target: "thread", "engine torn down after {} ticks", self.tree.tick());
    }

    // --- Tasks ---

    pub fn append(&self, task: impl Task + 'static) {
        self.tasks.append_task(task);
    }

    pub fn add_audio(&self, audio: Arc<Audio>) -> Receiver<AudioKey> {
        let (tx, rx) = unbounded();
        let mut task = AddAudio::new(self.registry.clone(), audio).with_reply(tx);
        if let Some(card) = self.soundcard() {
            task = task.soundcard(card);
        }
        if let Some(sequencer) = self.sequencers().into_iter().next() {
            task = task.sequencer(sequencer);
        }
        self.append(task);
        rx
    }

    pub fn remove_audio(&self, key: AudioKey) -> Receiver<Option<Arc<Audio>>> {
        let (tx, rx) = unbounded();
        self.append(RemoveAudio::new(self.registry.clone(), key, self.audio_loop.clone()).with_reply(tx));
        rx
    }

    /// Apply `presets` to the default soundcard, every audio and the tick rate.
    pub fn apply_presets(&self, presets: Presets) -> Receiver<EngineResult<()>> {
        let (tx, rx) = unbounded();
        let mut threads = vec![self.tree.root().clone(), self.audio_thread.clone(), self.midi_thread.clone()];
        threads.extend(self.soundcards.lock().iter().map(|d| d.thread.clone()));
        threads.extend(self.sequencers.lock().iter().map(|d| d.thread.clone()));
        self.append(
            ApplyPresets::new(self.soundcard(), self.registry.audios(), presets)
                .retune(threads, self.config.overclock)
                .with_reply(tx),
        );
        rx
    }

    pub fn apply_bpm(&self, bpm: f64) -> Receiver<BpmReport> {
        let (tx, rx) = unbounded();
        self.append(
            ApplyBpm::new(bpm, self.registry.audios())
                .with_devices(self.soundcards(), self.sequencers())
                .with_reply(tx),
        );
        rx
    }

    pub fn resize(
        &self,
        audio: &Arc<Audio>,
        audio_channels: u32,
        output_pads: u32,
        input_pads: u32,
    ) -> Receiver<GraphResult<()>> {
        let (tx, rx) = unbounded();
        self.append(
            ResizeAudio::new(audio.clone())
                .audio_channels(audio_channels)
                .output_pads(output_pads)
                .input_pads(input_pads)
                .with_reply(tx),
        );
        rx
    }

    pub fn link(&self, a: &Arc<Channel>, b: &Arc<Channel>) -> Receiver<GraphResult<()>> {
        let (tx, rx) = unbounded();
        self.append(LinkChannel::new(a.clone(), b.clone()).with_reply(tx));
        rx
    }

    pub fn unlink(&self, channel: &Arc<Channel>) -> Receiver<GraphResult<()>> {
        let (tx, rx) = unbounded();
        self.append(UnlinkChannel::new(channel.clone()).with_reply(tx));
        rx
    }

    pub fn play_channel(&self, channel: &Arc<Channel>, scope: SoundScope) -> Receiver<GraphResult<Arc<Voice>>> {
        let (tx, rx) = unbounded();
        self.append(StartChannel::new(channel.clone(), scope, self.audio_loop.clone()).with_reply(tx));
        rx
    }

    pub fn play_audio(&self, audio: &Arc<Audio>, scope: SoundScope) -> Receiver<GraphResult<Vec<Arc<Voice>>>> {
        let (tx, rx) = unbounded();
        self.append(StartAudio::new(audio.clone(), scope, self.audio_loop.clone()).with_reply(tx));
        rx
    }

    pub fn stop_channel(&self, channel: &Arc<Channel>, scope: SoundScope) {
        self.append(CancelChannel::new(channel.clone(), scope, self.audio_loop.clone()));
    }

    pub fn stop_audio(&self, audio: &Arc<Audio>, scope: SoundScope) {
        self.append(CancelAudio::new(audio.clone(), scope, self.audio_loop.clone()));
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        self.tasks.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::flags;
    use crate::channel::Direction;
    use tw_audio::{shared_soundcard, NullSoundcard};
    use tw_thread::TreeMode;

    fn stepped() -> EngineContext {
        let config = EngineConfig {
            tree: TreeConfig {
                mode: TreeMode::SingleThreaded,
                ..TreeConfig::default()
            },
            task_mode: TaskMode::Inline,
            ..EngineConfig::default()
        };
        let engine = EngineContext::init(config, shared_soundcard(NullSoundcard::new(Presets::default()))).unwrap();
        engine.start_stepped().unwrap();
        engine
    }

    #[test]
    fn tree_has_audio_and_midi_loops() {
        let engine = stepped();
        let names: Vec<String> = engine.tree().root().children().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, ["audio-loop", "midi-loop"]);
        assert_eq!(engine.audio_thread().children().len(), 1);
        assert_eq!(engine.frequency(), Presets::default().frequency(0.0));
        engine.teardown();
    }

    #[test]
    fn tasks_run_on_the_next_step() {
        let engine = stepped();
        let audio = Audio::new("a", flags::OUTPUT_HAS_RECYCLING, &Presets::default());
        let key = engine.add_audio(audio.clone());
        let resized = engine.resize(&audio, 2, 1, 1);
        assert!(key.try_recv().is_err());
        assert!(resized.try_recv().is_err());

        engine.step().unwrap();
        assert!(engine.registry().get(key.recv().unwrap()).is_some());
        assert_eq!(resized.try_recv().unwrap(), Ok(()));
        assert_eq!(audio.channel_count(Direction::Output), 2);
        assert!(audio.soundcard().is_some());
        engine.teardown();
    }

    #[test]
    fn soundcard_plays_every_tick() {
        let mut card = NullSoundcard::new(Presets::default());
        let capture = card.capture(16);
        let config = EngineConfig {
            tree: TreeConfig {
                mode: TreeMode::SingleThreaded,
                ..TreeConfig::default()
            },
            task_mode: TaskMode::Inline,
            ..EngineConfig::default()
        };
        let engine = EngineContext::init(config, shared_soundcard(card)).unwrap();
        engine.start_stepped().unwrap();
        for _ in 0..5 {
            engine.step().unwrap();
        }
        assert_eq!(capture.len(), 5);
        engine.teardown();
    }
}
