//! Streaming WAV encoding of soundcard buffers.
//!
//! The header is written with zero sizes and patched on [`finish`](WavWriter::finish),
//! so a file of unknown length can be written buffer by buffer.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;
use tw_engine::ExportSink;
use tw_ir::{AudioBuffer, Presets, SampleFormat};

const FORMAT_PCM: u16 = 1;
const FORMAT_FLOAT: u16 = 3;
const HEADER_LEN: u64 = 44;

/// Sample encoding of a WAV file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    U8,
    I16,
    I24,
    I32,
    F32,
    F64,
}

impl Encoding {
    fn for_format(format: SampleFormat) -> Self {
        match format {
            SampleFormat::S8 => Encoding::U8,
            SampleFormat::S16 => Encoding::I16,
            SampleFormat::S24 => Encoding::I24,
            // 64-bit integer PCM is not widely readable
            SampleFormat::S32 | SampleFormat::S64 => Encoding::I32,
            SampleFormat::Float => Encoding::F32,
            SampleFormat::Double => Encoding::F64,
        }
    }

    fn bits(self) -> u16 {
        match self {
            Encoding::U8 => 8,
            Encoding::I16 => 16,
            Encoding::I24 => 24,
            Encoding::I32 | Encoding::F32 => 32,
            Encoding::F64 => 64,
        }
    }

    fn tag(self) -> u16 {
        match self {
            Encoding::F32 | Encoding::F64 => FORMAT_FLOAT,
            _ => FORMAT_PCM,
        }
    }

    fn write(self, w: &mut impl Write, sample: f32) -> io::Result<()> {
        let s = sample.clamp(-1.0, 1.0);
        match self {
            Encoding::U8 => w.write_all(&[((s * 127.0) as i16 + 128) as u8]),
            Encoding::I16 => w.write_all(&((s * i16::MAX as f32) as i16).to_le_bytes()),
            Encoding::I24 => {
                let v = (s * 8_388_607.0) as i32;
                w.write_all(&v.to_le_bytes()[..3])
            }
            Encoding::I32 => w.write_all(&((s as f64 * i32::MAX as f64) as i32).to_le_bytes()),
            Encoding::F32 => w.write_all(&s.to_le_bytes()),
            Encoding::F64 => w.write_all(&(s as f64).to_le_bytes()),
        }
    }
}

/// Writes interleaved frames of planar [`AudioBuffer`]s.
pub struct WavWriter<W: Write + Seek> {
    inner: W,
    channels: u16,
    samplerate: u32,
    encoding: Encoding,
    data_bytes: u64,
    finished: bool,
}

impl WavWriter<BufWriter<File>> {
    /// Create or truncate `path`.
    pub fn create(path: impl AsRef<Path>, presets: &Presets) -> io::Result<Self> {
        let file = File::create(path.as_ref())?;
        debug!(target: "export", "writing {}", path.as_ref().display());
        Self::new(BufWriter::new(file), presets)
    }
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(mut inner: W, presets: &Presets) -> io::Result<Self> {
        let encoding = Encoding::for_format(presets.format);
        let channels = presets.pcm_channels;
        write_riff_header(&mut inner, 0)?;
        write_fmt_chunk(&mut inner, encoding, channels, presets.samplerate)?;
        inner.write_all(b"data")?;
        inner.write_all(&0u32.to_le_bytes())?;
        Ok(Self {
            inner,
            channels,
            samplerate: presets.samplerate,
            encoding,
            data_bytes: 0,
            finished: false,
        })
    }

    /// Frames written so far.
    pub fn frames(&self) -> u64 {
        let frame_bytes = self.channels as u64 * (self.encoding.bits() / 8) as u64;
        self.data_bytes / frame_bytes.max(1)
    }

    pub fn samplerate(&self) -> u32 {
        self.samplerate
    }

    /// Append one buffer. Channels the buffer lacks are written silent.
    pub fn write_buffer(&mut self, buffer: &AudioBuffer) -> io::Result<()> {
        for frame in 0..buffer.frames() as usize {
            for ch in 0..self.channels {
                let sample = if ch < buffer.channels() { buffer.channel(ch)[frame] } else { 0.0 };
                self.encoding.write(&mut self.inner, sample)?;
            }
        }
        self.data_bytes += buffer.frames() as u64 * self.channels as u64 * (self.encoding.bits() / 8) as u64;
        Ok(())
    }

    /// Patch the chunk sizes and flush. Later calls do nothing.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let data = u32::try_from(self.data_bytes)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "wav data exceeds 4 GiB"))?;
        // A pad byte keeps odd sized data chunks word aligned.
        if data % 2 == 1 {
            self.inner.write_all(&[0])?;
        }
        self.inner.seek(SeekFrom::Start(4))?;
        self.inner.write_all(&(36 + data + data % 2).to_le_bytes())?;
        self.inner.seek(SeekFrom::Start(HEADER_LEN - 4))?;
        self.inner.write_all(&data.to_le_bytes())?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;
        debug!(target: "export", "wav finalized: {} frames", self.frames());
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Seek + Send> ExportSink for WavWriter<W> {
    fn write(&mut self, buffer: &AudioBuffer) -> io::Result<()> {
        self.write_buffer(buffer)
    }

    fn finish(&mut self) -> io::Result<()> {
        WavWriter::finish(self)
    }
}

fn write_riff_header(w: &mut impl Write, data_size: u32) -> io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")
}

fn write_fmt_chunk(w: &mut impl Write, encoding: Encoding, channels: u16, samplerate: u32) -> io::Result<()> {
    let block_align = channels * (encoding.bits() / 8);
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&encoding.tag().to_le_bytes())?;
    w.write_all(&channels.to_le_bytes())?;
    w.write_all(&samplerate.to_le_bytes())?;
    w.write_all(&(samplerate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&encoding.bits().to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn u16_at(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    fn stereo(frames: u32, left: f32, right: f32) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(2, frames);
        buffer.channel_mut(0).fill(left);
        buffer.channel_mut(1).fill(right);
        buffer
    }

    #[test]
    fn header_is_patched_on_finish() {
        let presets = Presets::default();
        let mut wav = WavWriter::new(Cursor::new(Vec::new()), &presets).unwrap();
        wav.write_buffer(&stereo(4, 0.5, -0.5)).unwrap();
        wav.write_buffer(&stereo(4, 0.0, 1.0)).unwrap();
        wav.finish().unwrap();
        assert_eq!(wav.frames(), 8);
        let bytes = wav.into_inner().into_inner();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(u16_at(&bytes, 20), FORMAT_PCM);
        assert_eq!(u16_at(&bytes, 22), 2);
        assert_eq!(u32_at(&bytes, 24), 44_100);
        assert_eq!(u16_at(&bytes, 34), 16);
        assert_eq!(u32_at(&bytes, 40), 8 * 4);
        assert_eq!(u32_at(&bytes, 4), 36 + 8 * 4);
        assert_eq!(bytes.len(), 44 + 32);

        // Interleaved: left then right
        let left = i16::from_le_bytes([bytes[44], bytes[45]]);
        let right = i16::from_le_bytes([bytes[46], bytes[47]]);
        assert_eq!(left, (0.5 * i16::MAX as f32) as i16);
        assert_eq!(right, -left);
    }

    #[test]
    fn float_format_and_clamping() {
        let presets = Presets::new(1, 48_000, 2, SampleFormat::Float);
        let mut wav = WavWriter::new(Cursor::new(Vec::new()), &presets).unwrap();
        let mut buffer = AudioBuffer::new(1, 2);
        buffer.channel_mut(0).copy_from_slice(&[2.0, -0.25]);
        wav.write_buffer(&buffer).unwrap();
        ExportSink::finish(&mut wav).unwrap();
        let bytes = wav.into_inner().into_inner();
        assert_eq!(u16_at(&bytes, 20), FORMAT_FLOAT);
        assert_eq!(u16_at(&bytes, 34), 32);
        let first = f32::from_le_bytes([bytes[44], bytes[45], bytes[46], bytes[47]]);
        let second = f32::from_le_bytes([bytes[48], bytes[49], bytes[50], bytes[51]]);
        assert_eq!(first, 1.0);
        assert_eq!(second, -0.25);
    }

    #[test]
    fn odd_data_is_padded() {
        let presets = Presets::new(1, 8_000, 3, SampleFormat::S8);
        let mut wav = WavWriter::new(Cursor::new(Vec::new()), &presets).unwrap();
        wav.write_buffer(&AudioBuffer::new(1, 3)).unwrap();
        wav.finish().unwrap();
        wav.finish().unwrap();
        let bytes = wav.into_inner().into_inner();
        assert_eq!(u32_at(&bytes, 40), 3);
        assert_eq!(bytes.len(), 44 + 4);
        assert_eq!(&bytes[44..47], &[128, 128, 128]);
    }

    #[test]
    fn missing_channels_are_silent() {
        let presets = Presets::new(2, 44_100, 1, SampleFormat::S16);
        let mut wav = WavWriter::new(Cursor::new(Vec::new()), &presets).unwrap();
        let mut mono = AudioBuffer::new(1, 1);
        mono.channel_mut(0)[0] = 1.0;
        wav.write_buffer(&mono).unwrap();
        wav.finish().unwrap();
        let bytes = wav.into_inner().into_inner();
        assert_eq!(i16::from_le_bytes([bytes[44], bytes[45]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[46], bytes[47]]), 0);
    }
}
