//! CPAL-based soundcard.
//!
//! The engine pushes interleaved samples into a ring buffer once per tick;
//! the device callback drains it. Stream errors latch a failure flag that
//! the next `play()` reports. Recording opens an input stream that fills a
//! second ring, drained by `record()`.
//!
//! cpal streams cannot leave the thread that built them, so the stream lives
//! on a small holder thread controlled over a channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tw_ir::Presets;

use crate::error::{AudioError, AudioResult};
use crate::soundcard::{Soundcard, SoundcardCore};

/// Which audio host to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CpalHost {
    #[default]
    Default,
    Alsa,
    Jack,
    Wasapi,
}

impl CpalHost {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "default" => Some(CpalHost::Default),
            "alsa" => Some(CpalHost::Alsa),
            "jack" => Some(CpalHost::Jack),
            "wasapi" => Some(CpalHost::Wasapi),
            _ => None,
        }
    }

    fn id_name(self) -> &'static str {
        match self {
            CpalHost::Default => "default",
            CpalHost::Alsa => "alsa",
            CpalHost::Jack => "jack",
            CpalHost::Wasapi => "wasapi",
        }
    }

    fn open(self) -> AudioResult<cpal::Host> {
        if self == CpalHost::Default {
            return Ok(cpal::default_host());
        }
        let id = cpal::available_hosts()
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(self.id_name()))
            .ok_or_else(|| AudioError::UnknownHost(self.id_name().into()))?;
        cpal::host_from_id(id).map_err(|e| AudioError::DeviceInit(e.to_string()))
    }
}

enum StreamCommand {
    Play,
    Pause,
}

/// Device side of a stream's ring buffer.
enum StreamEnd {
    Output(HeapCons<f32>),
    Input(HeapProd<f32>),
}

struct StreamHolder {
    control: mpsc::Sender<StreamCommand>,
    handle: JoinHandle<()>,
}

pub struct CpalSoundcard {
    name: String,
    host: CpalHost,
    core: SoundcardCore,
    config: StreamConfig,
    holder: Option<StreamHolder>,
    producer: HeapProd<f32>,
    consumer: Option<HeapCons<f32>>,
    scratch: Vec<f32>,
    input: Option<StreamHolder>,
    captured: Option<HeapCons<f32>>,
    running: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    dropped: u64,
}

impl CpalSoundcard {
    /// Check that the host has a default output device and prepare a
    /// soundcard for it. The stream opens on [`start`](Soundcard::start).
    pub fn new(host: CpalHost, presets: Presets) -> AudioResult<Self> {
        let device = host.open()?.default_output_device().ok_or(AudioError::NoDevice)?;
        let name = device.name().unwrap_or_else(|_| "cpal".into());

        let config = StreamConfig {
            channels: presets.pcm_channels,
            sample_rate: SampleRate(presets.samplerate),
            buffer_size: BufferSize::Default,
        };

        let (producer, consumer) = ring_for(&presets);
        log::info!(target: "soundcard", "using {} on {:?} host", name, host);

        Ok(Self {
            name,
            host,
            core: SoundcardCore::new(presets),
            config,
            holder: None,
            producer,
            consumer: Some(consumer),
            scratch: vec![0.0; presets.pcm_channels as usize * presets.buffer_size as usize],
            input: None,
            captured: None,
            running: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(AtomicBool::new(false)),
            dropped: 0,
        })
    }

    /// Samples dropped because the device fell behind.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped
    }

    fn open_output(&mut self) -> AudioResult<StreamHolder> {
        let consumer = self
            .consumer
            .take()
            .ok_or_else(|| AudioError::StreamCreate("ring buffer already in use".into()))?;
        self.open_stream(StreamEnd::Output(consumer))
    }

    fn open_stream(&self, end: StreamEnd) -> AudioResult<StreamHolder> {
        let host = self.host;
        let config = self.config.clone();
        let running = self.running.clone();
        let failed = self.failed.clone();
        let name = self.name.clone();

        let (control, commands) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<AudioResult<()>>(1);

        let handle = std::thread::Builder::new()
            .name("cpal-stream".into())
            .spawn(move || {
                let stream = match build_stream(host, &config, end, running, failed, name) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Runs until the soundcard drops its sender.
                while let Ok(command) = commands.recv() {
                    let result = match command {
                        StreamCommand::Play => stream.play().map_err(|e| e.to_string()),
                        StreamCommand::Pause => stream.pause().map_err(|e| e.to_string()),
                    };
                    if let Err(e) = result {
                        log::warn!(target: "soundcard", "stream control failed: {}", e);
                    }
                }
            })
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(StreamHolder { control, handle }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(AudioError::StreamCreate("stream thread exited".into())),
        }
    }

    fn close_stream(&mut self) {
        for holder in [self.holder.take(), self.input.take()].into_iter().flatten() {
            drop(holder.control);
            if holder.handle.join().is_err() {
                log::error!(target: "soundcard", "{} stream thread panicked", self.name);
            }
        }
        self.captured = None;
    }
}

fn build_stream(
    host: CpalHost,
    config: &StreamConfig,
    end: StreamEnd,
    running: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    name: String,
) -> AudioResult<cpal::Stream> {
    let host = host.open()?;
    let on_error = move |err: cpal::StreamError| {
        log::error!(target: "soundcard", "{} stream error: {}", name, err);
        failed.store(true, Ordering::Release);
    };

    let stream = match end {
        StreamEnd::Output(mut consumer) => {
            let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
            device.build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut fill = || {
                        if !running.load(Ordering::Relaxed) {
                            data.fill(0.0);
                            return;
                        }
                        let read = consumer.pop_slice(data);
                        data[read..].fill(0.0);
                    };
                    #[cfg(feature = "alloc_check")]
                    assert_no_alloc::assert_no_alloc(fill);
                    #[cfg(not(feature = "alloc_check"))]
                    fill();
                },
                on_error,
                None,
            )
        }
        StreamEnd::Input(mut producer) => {
            let device = host.default_input_device().ok_or(AudioError::NoDevice)?;
            device.build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // A full ring drops the newest frames.
                    producer.push_slice(data);
                },
                on_error,
                None,
            )
        }
    }
    .map_err(|e| AudioError::StreamCreate(e.to_string()))?;
    stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
    Ok(stream)
}

fn ring_for(presets: &Presets) -> (HeapProd<f32>, HeapCons<f32>) {
    let channels = presets.pcm_channels.max(1) as usize;
    // About 100ms, and never less than four device buffers.
    let capacity = (presets.samplerate as usize / 10 * channels)
        .max(4 * presets.buffer_size as usize * channels);
    HeapRb::<f32>::new(capacity).split()
}

impl Soundcard for CpalSoundcard {
    fn name(&self) -> &str {
        &self.name
    }

    fn core(&self) -> &SoundcardCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SoundcardCore {
        &mut self.core
    }

    fn start(&mut self) -> AudioResult<()> {
        self.failed.store(false, Ordering::Release);
        self.running.store(true, Ordering::Relaxed);
        match &self.holder {
            Some(holder) => {
                let _ = holder.control.send(StreamCommand::Play);
            }
            None => match self.open_output() {
                Ok(holder) => self.holder = Some(holder),
                Err(e) => {
                    self.running.store(false, Ordering::Relaxed);
                    return Err(e);
                }
            },
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(holder) = &self.holder {
            let _ = holder.control.send(StreamCommand::Pause);
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn play(&mut self) -> AudioResult<()> {
        if self.failed.load(Ordering::Acquire) {
            self.running.store(false, Ordering::Relaxed);
            return Err(AudioError::Stream(format!("{}: device failed", self.name)));
        }
        if !self.is_running() {
            return Err(AudioError::NotRunning);
        }

        let written = self.core.buffer().write_interleaved(&mut self.scratch);
        let pushed = self.producer.push_slice(&self.scratch[..written]);
        if pushed < written {
            self.dropped += (written - pushed) as u64;
            log::trace!(target: "soundcard", "{} dropped {} samples", self.name, written - pushed);
        }
        self.core.swap_buffers();
        Ok(())
    }

    fn record_init(&mut self) -> AudioResult<()> {
        if self.input.is_none() {
            let (producer, consumer) = ring_for(&self.core.presets());
            let holder = self.open_stream(StreamEnd::Input(producer))?;
            self.input = Some(holder);
            self.captured = Some(consumer);
            log::debug!(target: "soundcard", "{} input stream open", self.name);
        }
        self.core.set_recording(true);
        Ok(())
    }

    /// Move one buffer of captured frames into the input buffer, padding
    /// with silence when the device is behind.
    fn record(&mut self) -> AudioResult<()> {
        let Some(captured) = self.captured.as_mut() else {
            self.core.input_mut().silence();
            return Ok(());
        };
        let read = captured.pop_slice(&mut self.scratch);
        self.scratch[read..].fill(0.0);
        let channels = self.config.channels;
        self.core.input_mut().read_interleaved(&self.scratch, channels);
        Ok(())
    }

    fn set_presets(&mut self, presets: Presets) -> AudioResult<()> {
        self.core.set_presets(presets)?;
        if presets.pcm_channels != self.config.channels || presets.samplerate != self.config.sample_rate.0 {
            // The stream owns the old ring; rebuild both.
            let was_running = self.is_running();
            let was_recording = self.input.is_some();
            self.stop();
            self.close_stream();
            self.config.channels = presets.pcm_channels;
            self.config.sample_rate = SampleRate(presets.samplerate);
            let (producer, consumer) = ring_for(&presets);
            self.producer = producer;
            self.consumer = Some(consumer);
            if was_running {
                self.start()?;
            }
            if was_recording {
                self.record_init()?;
            }
        }
        self.scratch
            .resize(presets.pcm_channels as usize * presets.buffer_size as usize, 0.0);
        Ok(())
    }
}

impl Drop for CpalSoundcard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        log::debug!(
            target: "soundcard",
            "{} closing, {} samples queued, {} dropped",
            self.name,
            self.producer.occupied_len(),
            self.dropped
        );
        self.close_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_names() {
        assert_eq!(CpalHost::from_name("ALSA"), Some(CpalHost::Alsa));
        assert_eq!(CpalHost::from_name("jack"), Some(CpalHost::Jack));
        assert_eq!(CpalHost::from_name("pulse"), None);
    }

    #[test]
    fn ring_holds_at_least_four_buffers() {
        let presets = Presets::new(2, 8000, 1024, tw_ir::SampleFormat::S16);
        let (prod, _cons) = ring_for(&presets);
        assert!(prod.capacity().get() >= 4 * 1024 * 2);
    }
}
