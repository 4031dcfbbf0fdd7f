//! Topology properties: resize sequences and links.

use std::sync::Arc;

use tw_engine::audio::{flags, MAX_LINES};
use tw_engine::{link, unlink, Audio, AudioSignal, Direction, GraphError};
use tw_ir::Presets;

fn audio(name: &str) -> Arc<Audio> {
    Audio::new(
        name,
        flags::OUTPUT_HAS_RECYCLING | flags::INPUT_HAS_RECYCLING | flags::SYNC,
        &Presets::default(),
    )
}

fn assert_counts(a: &Audio) {
    for direction in [Direction::Output, Direction::Input] {
        let channels = a.channels(direction);
        assert_eq!(channels.len() as u32, a.audio_channels() * a.pads(direction));
        for (line, channel) in channels.iter().enumerate() {
            assert_eq!(channel.line(), line as u32);
            assert_eq!(channel.line(), channel.pad() * a.audio_channels() + channel.audio_channel());
        }
    }
}

#[test]
fn resize_sequence_keeps_counts() {
    let a = audio("a");
    let steps = [(1, 1, 1), (2, 1, 4), (4, 3, 4), (1, 0, 2), (3, 2, 0), (0, 5, 5), (2, 2, 2)];
    for (ac, outputs, inputs) in steps {
        a.resize(ac, outputs, inputs).unwrap();
        assert_counts(&a);
    }
}

#[test]
fn oversized_resize_changes_nothing() {
    let a = audio("a");
    a.resize(2, 1, 1).unwrap();
    let before: Vec<u64> = a.outputs().iter().map(|c| c.id()).collect();

    let err = a.resize(1 << 16, 1 << 16, 0).unwrap_err();
    assert!(matches!(
        err,
        GraphError::ChannelOutOfRange { index: u32::MAX, available: MAX_LINES, .. }
    ));
    assert!(a.resize(2, 0, MAX_LINES).is_err());
    assert!(a.set_pads(Direction::Input, MAX_LINES).is_err());

    assert_eq!(a.audio_channels(), 2);
    assert_eq!(a.channel_count(Direction::Output), 2);
    assert_eq!(a.channel_count(Direction::Input), 2);
    let after: Vec<u64> = a.outputs().iter().map(|c| c.id()).collect();
    assert_eq!(before, after);
    assert_counts(&a);
}

#[test]
fn growing_keeps_existing_channels() {
    let a = audio("a");
    a.resize(2, 2, 2).unwrap();
    let before = a.channel_at(Direction::Output, 1, 1).unwrap();
    a.set_audio_channels(4).unwrap();
    let after = a.channel_at(Direction::Output, 1, 1).unwrap();
    assert_eq!(before.id(), after.id());
    assert_eq!(after.line(), 5);

    let fresh = a.channel_at(Direction::Output, 1, 3).unwrap();
    assert!(!fresh.is_linked());
    let template = fresh.own_recycling().unwrap().template();
    assert!(template.map_or(true, |t| t.is_empty()));
}

#[test]
fn shrinking_retires_channels_with_voice_signals() {
    let presets = Presets::default();
    let a = audio("a");
    a.resize(1, 2, 1).unwrap();
    let dropped = a.channel(Direction::Output, 1).unwrap();
    let recycling = dropped.own_recycling().unwrap();
    recycling.add_signal(Arc::new(AudioSignal::new(&presets, Some(7))));
    let weak = Arc::downgrade(&dropped);
    drop(dropped);

    a.set_pads(Direction::Output, 1).unwrap();
    assert_counts(&a);
    assert_eq!(a.retired_count(), 1);
    assert!(weak.upgrade().is_some());

    recycling.release_voice(7);
    assert_eq!(a.reap_retired(), 0);
    assert!(weak.upgrade().is_none());
}

#[test]
fn shrinking_unlinks_dropped_channels() {
    let a = audio("a");
    let b = audio("b");
    a.resize(1, 2, 0).unwrap();
    b.resize(1, 0, 1).unwrap();
    let input = b.channel(Direction::Input, 0).unwrap();
    link(&a.channel(Direction::Output, 1).unwrap(), &input).unwrap();

    a.set_pads(Direction::Output, 1).unwrap();
    assert!(!input.is_linked());
}

#[test]
fn failed_links_change_nothing() {
    let chain: Vec<Arc<Audio>> = ["a", "b", "c"].into_iter().map(audio).collect();
    for a in &chain {
        a.resize(1, 2, 2).unwrap();
    }
    for pair in chain.windows(2) {
        let out = pair[0].channel(Direction::Output, 0).unwrap();
        let inp = pair[1].channel(Direction::Input, 0).unwrap();
        link(&out, &inp).unwrap();
    }

    let back = chain[2].channel(Direction::Output, 1).unwrap();
    let front = chain[0].channel(Direction::Input, 1).unwrap();
    let err = link(&back, &front).unwrap_err();
    assert!(matches!(err, GraphError::LoopInLink { .. }));
    assert!(!back.is_linked());
    assert!(!front.is_linked());

    let taken = chain[1].channel(Direction::Input, 0).unwrap();
    assert!(matches!(link(&back, &taken), Err(GraphError::AlreadyLinked(_))));
    assert!(!back.is_linked());
    assert_eq!(
        taken.link().unwrap().id(),
        chain[0].channel(Direction::Output, 0).unwrap().id()
    );

    unlink(&taken).unwrap();
    link(&back, &front).unwrap();
    assert!(front.is_linked());
}
