//! Benchmarks for the audio loop tick.
//!
//! Run with: cargo bench -p tw-engine
//!
//! One tick has a deadline of `buffer_size / samplerate`, about 11.6ms at
//! the default 512 frames and 44100 Hz.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use tw_engine::audio::flags;
use tw_engine::thread::AudioLoop;
use tw_engine::{
    Audio, AudioSignal, Channel, Direction, RecallFactory, RecallId, RecyclingContext, Target, Voice,
};
use tw_ir::{Presets, SoundScope};

const VOICES: &[usize] = &[1, 8, 32];
const TICKS: usize = 16;

fn source(index: usize, presets: &Presets) -> (Arc<Audio>, Arc<Channel>) {
    let audio = Audio::new(&format!("src-{index}"), flags::OUTPUT_HAS_RECYCLING, presets);
    audio.resize(1, 1, 0).unwrap();
    for effect in ["stream", "volume"] {
        RecallFactory::create(&audio, effect, Target::outputs(&audio), RecallFactory::PLAY)
            .expect("effect");
    }
    let output = audio.channel(Direction::Output, 0).expect("output");
    let samples = vec![0.25; (TICKS + 1) * presets.buffer_size as usize];
    output
        .own_recycling()
        .expect("recycling")
        .set_template(Arc::new(AudioSignal::template_from_samples(presets, &samples)));
    (audio, output)
}

fn bench_audio_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("audio-loop/tick");
    let presets = Presets::default();

    for &count in VOICES {
        let sources: Vec<_> = (0..count).map(|i| source(i, &presets)).collect();

        group.bench_with_input(BenchmarkId::new("voices", count), &count, |b, _| {
            b.iter_batched(
                || {
                    let audio_loop = AudioLoop::new(false);
                    for (_, output) in &sources {
                        let context = RecyclingContext::new(SoundScope::Playback, output.recyclings());
                        audio_loop.add_voice(Voice::new(output.clone(), RecallId::new(context)));
                    }
                    audio_loop
                },
                |audio_loop| {
                    for _ in 0..TICKS {
                        black_box(audio_loop.run_voices());
                    }
                    audio_loop.cancel_all();
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_audio_tick);
criterion_main!(benches);
