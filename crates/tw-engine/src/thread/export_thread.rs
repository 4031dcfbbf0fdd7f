//! Export: stream what a soundcard played into a sink.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use log::{error, info};
use parking_lot::Mutex;
use tw_audio::SharedSoundcard;
use tw_ir::AudioBuffer;
use tw_thread::{Thread, ThreadError, ThreadResult, ThreadRun};

/// Destination of an export, e.g. a WAV file.
pub trait ExportSink: Send {
    fn write(&mut self, buffer: &AudioBuffer) -> io::Result<()>;

    /// Flush and close. Called once.
    fn finish(&mut self) -> io::Result<()>;
}

#[derive(Default)]
struct ExportStatus {
    written: AtomicU64,
    finished: AtomicBool,
    error: Mutex<Option<String>>,
}

/// Progress of a running export, readable from any thread.
#[derive(Clone)]
pub struct ExportHandle(Arc<ExportStatus>);

impl ExportHandle {
    /// Buffers handed to the sink so far.
    pub fn buffers_written(&self) -> u64 {
        self.0.written.load(Ordering::Acquire)
    }

    /// Whether the sink has been finalized.
    pub fn is_finished(&self) -> bool {
        self.0.finished.load(Ordering::Acquire)
    }

    /// First error the sink reported.
    pub fn error(&self) -> Option<String> {
        self.0.error.lock().clone()
    }
}

/// Writes the soundcard's previous buffer to a sink every tick.
///
/// Runs post-sync under the soundcard thread, so the previous buffer is the
/// one played this tick. Stops itself once `budget` buffers are written;
/// the sink is finalized when the thread stops for any reason.
pub struct ExportThread {
    soundcard: SharedSoundcard,
    sink: Box<dyn ExportSink>,
    budget: Option<u64>,
    status: Arc<ExportStatus>,
    node: Arc<OnceLock<Weak<Thread>>>,
}

impl ExportThread {
    pub fn new(soundcard: SharedSoundcard, sink: Box<dyn ExportSink>, budget: Option<u64>) -> Self {
        Self {
            soundcard,
            sink,
            budget,
            status: Arc::new(ExportStatus::default()),
            node: Arc::new(OnceLock::new()),
        }
    }

    pub fn handle(&self) -> ExportHandle {
        ExportHandle(self.status.clone())
    }

    /// Create the tree node. The caller attaches it under a soundcard thread.
    pub fn spawn(self, frequency: f64) -> (Arc<Thread>, ExportHandle) {
        let handle = self.handle();
        let node = self.node.clone();
        let thread = Thread::new("export", frequency, self);
        let _ = node.set(Arc::downgrade(&thread));
        (thread, handle)
    }

    fn budget_reached(&self) -> bool {
        self.budget
            .is_some_and(|budget| self.status.written.load(Ordering::Acquire) >= budget)
    }

    fn fail(&self, e: io::Error) -> ThreadError {
        error!(target: "export", "export failed: {e}");
        self.status.error.lock().get_or_insert_with(|| e.to_string());
        ThreadError::backend("export", e)
    }
}

impl ThreadRun for ExportThread {
    fn run(&mut self, _tick: u64) -> ThreadResult<()> {
        if !self.budget_reached() {
            let card = self.soundcard.lock();
            let written = self.sink.write(card.prev_buffer());
            drop(card);
            written.map_err(|e| self.fail(e))?;
            self.status.written.fetch_add(1, Ordering::AcqRel);
        }
        if self.budget_reached() {
            if let Some(thread) = self.node.get().and_then(Weak::upgrade) {
                thread.request_stop();
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        if self.status.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.sink.finish() {
            error!(target: "export", "failed to finalize export: {e}");
            self.status.error.lock().get_or_insert_with(|| e.to_string());
        }
        info!(target: "export", "export finished after {} buffers", self.status.written.load(Ordering::Acquire));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_audio::{shared_soundcard, NullSoundcard};
    use tw_ir::Presets;

    #[derive(Clone, Default)]
    struct Collect {
        buffers: Arc<Mutex<Vec<AudioBuffer>>>,
        finished: Arc<AtomicBool>,
        fail_after: Option<usize>,
    }

    impl ExportSink for Collect {
        fn write(&mut self, buffer: &AudioBuffer) -> io::Result<()> {
            let mut buffers = self.buffers.lock();
            if self.fail_after.is_some_and(|n| buffers.len() >= n) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            buffers.push(buffer.clone());
            Ok(())
        }

        fn finish(&mut self) -> io::Result<()> {
            self.finished.store(true, Ordering::Release);
            Ok(())
        }
    }

    #[test]
    fn writes_played_buffer_until_budget() {
        let card = shared_soundcard(NullSoundcard::new(Presets::default()));
        let sink = Collect::default();
        let mut export = ExportThread::new(card.clone(), Box::new(sink.clone()), Some(2));
        let handle = export.handle();

        for tick in 1..=4 {
            {
                let mut c = card.lock();
                c.buffer_mut().channel_mut(0)[0] = tick as f32;
                c.play().unwrap();
            }
            export.run(tick).unwrap();
        }
        export.stop();

        let buffers = sink.buffers.lock();
        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers[0].channel(0)[0], 1.0);
        assert_eq!(buffers[1].channel(0)[0], 2.0);
        assert_eq!(handle.buffers_written(), 2);
        assert!(handle.is_finished());
        assert!(sink.finished.load(Ordering::Acquire));
    }

    #[test]
    fn sink_error_fails_the_tick_and_is_recorded() {
        let card = shared_soundcard(NullSoundcard::new(Presets::default()));
        let sink = Collect {
            fail_after: Some(1),
            ..Collect::default()
        };
        let mut export = ExportThread::new(card, Box::new(sink.clone()), None);
        let handle = export.handle();
        export.run(1).unwrap();
        assert!(matches!(export.run(2), Err(ThreadError::Backend { .. })));
        export.stop();
        export.stop();
        assert_eq!(handle.error().as_deref(), Some("disk full"));
        assert!(sink.finished.load(Ordering::Acquire));
    }
}
