//! Allocation-free buffer path tests.
//!
//! The copy/mix helpers run on the audio tick; these tests abort on any
//! heap allocation inside them.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};
use tw_ir::{buffer_util, AudioBuffer};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

#[test]
fn attack_copy_does_not_allocate() {
    let prev = vec![0.25f32; 512];
    let cur = vec![0.5f32; 512];
    let mut dst = vec![0.0f32; 512];

    assert_no_alloc(|| {
        buffer_util::copy_with_attack(&mut dst, Some(&prev), &cur, 128, 1.0);
        buffer_util::scale(&mut dst, 0.5);
        buffer_util::mix(&mut dst, 0, &cur, 0, 64, 0.5);
    });

    assert_eq!(dst[0], 0.125 + 0.25);
    assert_eq!(dst[200], 0.25);
}

#[test]
fn soundcard_buffer_mix_does_not_allocate() {
    let mut out = AudioBuffer::new(2, 512);
    let plane = vec![0.1f32; 512];
    let mut interleaved = vec![0.0f32; 1024];

    assert_no_alloc(|| {
        out.silence();
        out.mix_into_channel(0, &plane, 1.0);
        out.mix_into_channel(1, &plane, -1.0);
        out.write_interleaved(&mut interleaved);
    });

    assert!((interleaved[0] - 0.1).abs() < 1e-6);
    assert!((interleaved[1] + 0.1).abs() < 1e-6);
}
