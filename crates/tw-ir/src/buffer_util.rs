//! Sample buffer helpers: offset copy and mix, attack-aligned copy,
//! linear resampling and sample format quantization.
//!
//! Everything except [`resample`] and [`encode`] works in place and never
//! allocates, so it can run on the audio tick.

use alloc::vec::Vec;

use crate::presets::SampleFormat;

/// Copy `count` samples from `src[src_offset..]` to `dst[dst_offset..]`.
///
/// The count is clamped to what both slices can hold. Returns the number
/// of samples copied.
pub fn copy(dst: &mut [f32], dst_offset: usize, src: &[f32], src_offset: usize, count: usize) -> usize {
    let n = clamp_count(dst.len(), dst_offset, src.len(), src_offset, count);
    if n > 0 {
        dst[dst_offset..dst_offset + n].copy_from_slice(&src[src_offset..src_offset + n]);
    }
    n
}

/// Sum `count` samples from `src[src_offset..]` into `dst[dst_offset..]` with gain.
pub fn mix(dst: &mut [f32], dst_offset: usize, src: &[f32], src_offset: usize, count: usize, gain: f32) -> usize {
    let n = clamp_count(dst.len(), dst_offset, src.len(), src_offset, count);
    for (d, s) in dst[dst_offset..dst_offset + n]
        .iter_mut()
        .zip(&src[src_offset..src_offset + n])
    {
        *d += *s * gain;
    }
    n
}

/// Multiply every sample by `gain`.
pub fn scale(buf: &mut [f32], gain: f32) {
    for s in buf {
        *s *= gain;
    }
}

fn clamp_count(dst_len: usize, dst_offset: usize, src_len: usize, src_offset: usize, count: usize) -> usize {
    if dst_offset >= dst_len || src_offset >= src_len {
        return 0;
    }
    count.min(dst_len - dst_offset).min(src_len - src_offset)
}

/// Copy one source buffer into a destination buffer shifted by `attack` frames.
///
/// The leading `attack` samples of `dst` come from the tail of `prev_src`
/// (silence if there is none), the body comes from the head of `src`.
/// These are two separate copies, so `dst` never reads past a buffer
/// boundary of the source stream.
pub fn copy_with_attack(dst: &mut [f32], prev_src: Option<&[f32]>, src: &[f32], attack: usize, gain: f32) {
    let len = dst.len();
    let attack = attack.min(len);

    if attack > 0 {
        match prev_src {
            Some(prev) if prev.len() >= attack => {
                let tail = prev.len() - attack;
                mix(dst, 0, prev, tail, attack, gain);
            }
            _ => {}
        }
    }
    mix(dst, attack, src, 0, len - attack, gain);
}

/// Rescale an attack offset from one sample rate to another:
/// `(dst_rate / src_rate) * attack`.
pub fn rescale_attack(attack: u32, src_rate: u32, dst_rate: u32) -> u32 {
    if src_rate == 0 || src_rate == dst_rate {
        return attack;
    }
    libm::floor((dst_rate as f64 / src_rate as f64) * attack as f64) as u32
}

/// Resample a whole buffer with linear interpolation.
///
/// The output has `ceil(len * dst_rate / src_rate)` samples.
pub fn resample(src: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == 0 || dst_rate == 0 || src_rate == dst_rate || src.is_empty() {
        return src.to_vec();
    }
    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = libm::ceil(src.len() as f64 * dst_rate as f64 / src_rate as f64) as usize;
    let last = src.len() - 1;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = libm::floor(pos) as usize;
        if idx >= last {
            out.push(src[last]);
            continue;
        }
        let frac = (pos - idx as f64) as f32;
        out.push(src[idx] + (src[idx + 1] - src[idx]) * frac);
    }
    out
}

/// Sum of squares.
pub fn energy(buf: &[f32]) -> f64 {
    buf.iter().map(|s| (*s as f64) * (*s as f64)).sum()
}

/// Root mean square level.
pub fn rms(buf: &[f32]) -> f64 {
    if buf.is_empty() {
        return 0.0;
    }
    libm::sqrt(energy(buf) / buf.len() as f64)
}

/// Largest absolute sample value.
pub fn peak(buf: &[f32]) -> f32 {
    buf.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Quantize a normalized sample to a signed integer of `format`'s width.
///
/// Float formats are not quantized and return the sample scaled by 2^31
/// so callers can still compare magnitudes; use [`encode`] for bytes.
pub fn quantize(sample: f32, format: SampleFormat) -> i64 {
    let s = sample.clamp(-1.0, 1.0) as f64;
    let max = match format {
        SampleFormat::S8 => i8::MAX as f64,
        SampleFormat::S16 => i16::MAX as f64,
        SampleFormat::S24 => 8_388_607.0,
        SampleFormat::S32 | SampleFormat::Float | SampleFormat::Double => i32::MAX as f64,
        SampleFormat::S64 => i64::MAX as f64,
    };
    libm::round(s * max) as i64
}

/// Inverse of [`quantize`].
pub fn dequantize(value: i64, format: SampleFormat) -> f32 {
    let max = match format {
        SampleFormat::S8 => i8::MAX as f64,
        SampleFormat::S16 => i16::MAX as f64,
        SampleFormat::S24 => 8_388_607.0,
        SampleFormat::S32 | SampleFormat::Float | SampleFormat::Double => i32::MAX as f64,
        SampleFormat::S64 => i64::MAX as f64,
    };
    (value as f64 / max) as f32
}

/// Append little-endian encoded samples of `format` to `out`.
pub fn encode(samples: &[f32], format: SampleFormat, out: &mut Vec<u8>) {
    out.reserve(samples.len() * format.bytes());
    for &s in samples {
        match format {
            SampleFormat::S8 => out.push(quantize(s, format) as i8 as u8),
            SampleFormat::S16 => out.extend_from_slice(&(quantize(s, format) as i16).to_le_bytes()),
            SampleFormat::S24 => {
                let v = quantize(s, format) as i32;
                out.extend_from_slice(&v.to_le_bytes()[..3]);
            }
            SampleFormat::S32 => out.extend_from_slice(&(quantize(s, format) as i32).to_le_bytes()),
            SampleFormat::S64 => out.extend_from_slice(&quantize(s, format).to_le_bytes()),
            SampleFormat::Float => out.extend_from_slice(&s.to_le_bytes()),
            SampleFormat::Double => out.extend_from_slice(&(s as f64).to_le_bytes()),
        }
    }
}
