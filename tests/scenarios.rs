//! End-to-end engine scenarios, stepped on the test thread.

use std::sync::Arc;

use tw_audio::{shared_sequencer, shared_soundcard, NullSequencer, NullSoundcard};
use tw_engine::audio::flags;
use tw_engine::{
    Audio, Direction, EngineConfig, EngineContext, RecallFactory, RecallStage, TaskMode, Target, VoiceState,
};
use tw_ir::{absolute_delay, Presets, SampleFormat, SoundScope};
use tw_master::demo;
use tw_thread::{TreeConfig, TreeMode};

fn engine(presets: Presets, super_threaded: bool) -> EngineContext {
    let config = EngineConfig {
        tree: TreeConfig {
            mode: TreeMode::SingleThreaded,
            ..TreeConfig::default()
        },
        task_mode: TaskMode::Inline,
        super_threaded_channels: super_threaded,
        ..EngineConfig::default()
    };
    let engine = EngineContext::init(config, shared_soundcard(NullSoundcard::new(presets))).unwrap();
    engine.start_stepped().unwrap();
    engine
}

fn plain(presets: &Presets, audio_channels: u32, pads: u32) -> Arc<Audio> {
    let audio = Audio::new(
        "plain",
        flags::OUTPUT_HAS_RECYCLING | flags::INPUT_HAS_RECYCLING | flags::SYNC,
        presets,
    );
    audio.resize(audio_channels, pads, pads).unwrap();
    audio
}

#[test]
fn apply_presets_reaches_every_channel_and_signal() {
    let before = Presets::new(2, 48_000, 1024, SampleFormat::Float);
    let engine = engine(before, false);
    let audio = plain(&before, 1, 1);
    for channel in audio.outputs().into_iter().chain(audio.inputs()) {
        channel.own_recycling().unwrap().ensure_template();
    }
    let key = engine.add_audio(audio.clone());
    engine.step().unwrap();
    assert!(key.try_recv().is_ok());

    let target = Presets::new(2, 44_100, 512, SampleFormat::S16);
    let applied = engine.apply_presets(target);
    engine.step().unwrap();
    assert!(matches!(applied.try_recv(), Ok(Ok(()))));

    let check = |p: Presets| {
        assert_eq!(p.samplerate, 44_100);
        assert_eq!(p.buffer_size, 512);
        assert_eq!(p.format, SampleFormat::S16);
    };
    check(audio.presets());
    for channel in audio.outputs().into_iter().chain(audio.inputs()) {
        check(channel.presets());
        let recycling = channel.own_recycling().unwrap();
        check(recycling.presets());
        check(recycling.template().unwrap().presets());
    }
    check(engine.soundcard().unwrap().lock().presets());
    engine.teardown();
}

#[test]
fn play_channel_queues_a_channel_thread() {
    let presets = Presets::default();
    let engine = engine(presets, true);
    let audio = plain(&presets, 1, 1);
    RecallFactory::create(&audio, "play", Target::outputs(&audio), RecallFactory::PLAY).unwrap();
    let _ = engine.add_audio(audio.clone());
    let output = audio.channel(Direction::Output, 0).unwrap();
    assert!(output.recall_ids().is_empty());

    let played = engine.play_channel(&output, SoundScope::Playback);
    engine.step().unwrap();
    let voice = played.try_recv().unwrap().unwrap();

    // One toplevel context over the channel's recyclings
    let context = voice.recall_id().context();
    assert!(context.is_toplevel());
    assert!(context.children().is_empty());
    assert_eq!(context.recyclings().len(), output.recyclings().len());

    let thread = output.playback().thread(SoundScope::Playback).unwrap();
    assert!(engine.audio_thread().is_queued(&thread));
    assert_eq!(engine.audio_thread().start_queue_len(), 1);

    engine.step().unwrap();
    assert!(!engine.audio_thread().is_queued(&thread));
    assert_eq!(voice.ticks(), 1);
    assert_eq!(voice.state(), VoiceState::Running);
    assert_eq!(output.recall_ids().len(), 1);
    let plays: Vec<_> = voice.instances().into_iter().filter(|r| r.effect() == "play").collect();
    assert_eq!(plays.len(), 1);
    assert!(plays.iter().all(|r| r.stage() == RecallStage::Running));
    engine.teardown();
}

#[test]
fn audio_channels_two_to_four() {
    let presets = Presets::default();
    let engine = engine(presets, false);
    let audio = plain(&presets, 2, 3);
    let _ = engine.add_audio(audio.clone());
    let before = audio.channel_count(Direction::Output);
    assert_eq!(before, 6);

    let resized = engine.resize(&audio, 4, 3, 3);
    engine.step().unwrap();
    assert_eq!(resized.try_recv().unwrap(), Ok(()));

    for direction in [Direction::Output, Direction::Input] {
        assert_eq!(audio.channel_count(direction), 2 * before);
        for pad in 0..3 {
            for ac in 2..4 {
                let fresh = audio.channel_at(direction, pad, ac).unwrap();
                assert_eq!(fresh.line(), pad * 4 + ac);
                assert!(!fresh.is_linked());
                let template = fresh.own_recycling().unwrap().template();
                assert!(template.map_or(true, |t| t.is_empty()));
            }
        }
    }
    engine.teardown();
}

#[test]
fn apply_bpm_reaches_audios_recalls_and_devices() {
    let presets = Presets::default();
    let engine = engine(presets, false);
    engine.add_sequencer(shared_sequencer(NullSequencer::new(presets)));
    let drum = demo::drum(&presets, true).unwrap();
    let _ = engine.add_audio(drum.clone());
    let played = engine.play_audio(&drum, SoundScope::Sequencer);
    engine.step().unwrap();
    engine.step().unwrap();
    let voices = played.try_recv().unwrap().unwrap();
    let delay = voices
        .iter()
        .flat_map(|v| v.instances())
        .find(|r| r.effect() == "delay" && r.kind().is_run())
        .unwrap();
    let tact = delay.port_value("tact").unwrap().as_f64();
    let bpm = delay.port_value("bpm").unwrap().as_f64();
    let sequencer_delay = || delay.port_value("sequencer-delay").unwrap().as_f64();
    let before = sequencer_delay();
    assert_eq!(before, absolute_delay(presets.samplerate, presets.buffer_size, bpm, tact));

    let tempo_aware = drum.all_recalls().iter().filter(|r| r.is_tempo_aware()).count();
    assert!(tempo_aware >= 1);

    let report = engine.apply_bpm(150.0);
    engine.step().unwrap();
    let report = report.try_recv().unwrap();
    assert_eq!(report.audios, 1);
    assert_eq!(report.recalls, tempo_aware);
    assert_eq!(report.soundcards, 1);
    assert_eq!(report.sequencers, 1);

    assert_eq!(drum.bpm(), 150.0);
    assert_eq!(engine.soundcard().unwrap().lock().bpm(), 150.0);
    assert_eq!(engine.sequencers()[0].lock().bpm(), 150.0);

    // The running voice picks the tempo up on its next tick.
    engine.step().unwrap();
    let after = sequencer_delay();
    assert_ne!(after, before);
    assert_eq!(after, absolute_delay(presets.samplerate, presets.buffer_size, 150.0, tact));
    engine.teardown();
}

#[test]
fn drum_reaches_the_soundcard() {
    let presets = Presets::default();
    let mut card = NullSoundcard::new(presets);
    let capture = card.capture(64);
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

    let drum = demo::drum(&presets, false).unwrap();
    let _ = engine.add_audio(drum.clone());
    let played = engine.play_audio(&drum, SoundScope::Sequencer);
    for _ in 0..48 {
        engine.step().unwrap();
    }
    assert_eq!(played.try_recv().unwrap().unwrap().len(), 2);
    assert!(!capture.is_empty());
    assert!(capture.peak() > 0.0);
    engine.teardown();
}
