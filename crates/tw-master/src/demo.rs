//! A small drum machine used by the CLI and the scenario tests.

use std::f32::consts::TAU;
use std::sync::Arc;

use tw_engine::audio::flags;
use tw_engine::{set_step, Audio, AudioSignal, Direction, GraphResult, RecallFactory, RecallList, Target};
use tw_ir::{PortValue, Presets};

/// Steps of the kick (input pad 0) and the hat (input pad 1).
pub const KICK_STEPS: [u32; 4] = [0, 4, 8, 12];
pub const HAT_STEPS: [u32; 4] = [2, 6, 10, 14];

/// Drum with a kick pad and a hat pad sequenced onto one output pad.
///
/// Every pad has one channel per PCM channel of `presets`. Outputs stream,
/// play and scale the voices; inputs carry the patterns.
/// With `looping` off the sequencer stops after one bar.
pub fn drum(presets: &Presets, looping: bool) -> GraphResult<Arc<Audio>> {
    let drum = Audio::new(
        "drum",
        flags::OUTPUT_HAS_RECYCLING | flags::INPUT_HAS_RECYCLING | flags::ASYNC,
        presets,
    );
    let audio_channels = presets.pcm_channels.max(1) as u32;
    drum.resize(audio_channels, 1, 2)?;

    for effect in ["delay", "count-beats", "stream", "play", "volume"] {
        RecallFactory::create(&drum, effect, Target::outputs(&drum), RecallFactory::PLAY)?;
    }
    RecallFactory::create(&drum, "pattern", Target::inputs(&drum), RecallFactory::PLAY)?;

    if let Some(counter) = drum.find_container("count-beats", RecallList::Play) {
        for port in counter.ports() {
            let mut port = port.lock();
            if port.name.as_str() == "loop" {
                port.set(PortValue::Bool(looping));
            }
        }
    }

    let pads = [(kick(presets.samplerate), KICK_STEPS), (hat(presets.samplerate), HAT_STEPS)];
    for (pad, (samples, steps)) in pads.iter().enumerate() {
        for ac in 0..audio_channels {
            let line = pad as u32 * audio_channels + ac;
            let input = drum.channel(Direction::Input, line)?;
            if let Some(recycling) = input.own_recycling() {
                recycling.set_template(Arc::new(AudioSignal::template_from_samples(presets, samples)));
            }
            for &step in steps {
                set_step(&drum, line, step, true)?;
            }
        }
    }
    Ok(drum)
}

/// Pitch dropping sine with an exponential decay, 150 ms.
fn kick(samplerate: u32) -> Vec<f32> {
    let len = samplerate as usize * 15 / 100;
    let mut phase = 0.0f32;
    (0..len)
        .map(|i| {
            let t = i as f32 / samplerate as f32;
            let freq = 50.0 + 100.0 * (-t * 30.0).exp();
            phase += TAU * freq / samplerate as f32;
            phase.sin() * (-t * 18.0).exp() * 0.8
        })
        .collect()
}

/// Short burst of deterministic noise, 40 ms.
fn hat(samplerate: u32) -> Vec<f32> {
    let len = samplerate as usize * 4 / 100;
    let mut seed = 0x2545_f491_u32;
    (0..len)
        .map(|i| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let noise = (seed as f32 / u32::MAX as f32) * 2.0 - 1.0;
            noise * (-(i as f32) / len as f32 * 6.0).exp() * 0.3
        })
        .collect()
}
