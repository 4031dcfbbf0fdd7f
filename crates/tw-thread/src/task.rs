//! Task queue: the single serialization point for graph mutations.
//!
//! Callers append tasks without blocking. The worker swaps the whole pending
//! batch into an exec list, then launches each task in enqueue order while
//! holding the tree's structural lock, so at most one mutation runs at a time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, ReentrantMutex};

use crate::error::{ThreadError, ThreadResult};

/// An atomic mutation with captured parameters.
///
/// `launch` must not block on the audio tick. Anything it hands to another
/// thread goes through the thread tree directly, never through a new task.
pub trait Task: Send {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn launch(&mut self);
}

/// FIFO queue of tasks executed under the tree lock.
pub struct TaskQueue {
    pending: Mutex<Vec<Box<dyn Task>>>,
    tree_lock: Arc<ReentrantMutex<()>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    running: AtomicBool,
    launched: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TaskQueue {
    pub fn new(tree_lock: Arc<ReentrantMutex<()>>) -> Arc<Self> {
        let (wake_tx, wake_rx) = bounded(1);
        Arc::new(Self {
            pending: Mutex::new(Vec::new()),
            tree_lock,
            wake_tx,
            wake_rx,
            running: AtomicBool::new(false),
            launched: AtomicU64::new(0),
            worker: Mutex::new(None),
        })
    }

    /// Enqueue one task.
    pub fn append_task(&self, task: impl Task + 'static) {
        self.pending.lock().push(Box::new(task));
        self.wake();
    }

    /// Enqueue several tasks; they launch in the given order.
    pub fn append_tasks(&self, tasks: Vec<Box<dyn Task>>) {
        if tasks.is_empty() {
            return;
        }
        self.pending.lock().extend(tasks);
        self.wake();
    }

    fn wake(&self) {
        match self.wake_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::warn!(target: "task", "task queue wake channel closed");
            }
        }
    }

    /// Tasks waiting for the next batch.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Tasks launched so far.
    pub fn launched(&self) -> u64 {
        self.launched.load(Ordering::Relaxed)
    }

    /// Launch the current batch on the calling thread.
    ///
    /// Tasks appended while the batch runs wait for the next call.
    pub fn run_pending(&self) -> usize {
        let mut exec = std::mem::take(&mut *self.pending.lock());
        if exec.is_empty() {
            return 0;
        }

        let _tree = self.tree_lock.lock();
        for task in exec.iter_mut() {
            log::debug!(target: "task", "launch {}", task.name());
            task.launch();
        }
        let count = exec.len();
        self.launched.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    pub fn is_worker_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the task thread and wait (bounded) until it is ready.
    pub fn spawn_worker(self: &Arc<Self>, timeout: Duration) -> ThreadResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(ThreadError::AlreadyRunning("task-queue".into()));
        }

        let (ready_tx, ready_rx) = bounded::<()>(1);
        let queue = self.clone();
        let handle = std::thread::Builder::new()
            .name("task-queue".into())
            .spawn(move || {
                let _ = ready_tx.send(());
                queue.worker_loop();
            })
            .map_err(|source| {
                self.running.store(false, Ordering::Release);
                ThreadError::Spawn {
                    name: "task-queue".into(),
                    source,
                }
            })?;
        *self.worker.lock() = Some(handle);

        if ready_rx.recv_timeout(timeout).is_err() {
            self.shutdown();
            return Err(ThreadError::StartTimeout {
                name: "task-queue".into(),
                timeout,
            });
        }
        Ok(())
    }

    fn worker_loop(&self) {
        log::debug!(target: "task", "task queue ready");
        // Work appended before the worker existed.
        self.run_pending();
        while self.wake_rx.recv().is_ok() {
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            self.run_pending();
        }
        log::debug!(target: "task", "task queue exited");
    }

    /// Stop the worker after its current batch. Pending tasks are kept.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        // The wake slot may be full; a blocking send guarantees the worker sees the stop.
        let _ = self.wake_tx.send_timeout((), Duration::from_millis(100));
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() && handle.join().is_err() {
                log::error!(target: "task", "task queue worker panicked");
            }
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Push(Arc<Mutex<Vec<u32>>>, u32);

    impl Task for Push {
        fn launch(&mut self) {
            self.0.lock().push(self.1);
        }
    }

    fn queue() -> Arc<TaskQueue> {
        TaskQueue::new(Arc::new(ReentrantMutex::new(())))
    }

    #[test]
    fn batch_runs_in_enqueue_order() {
        let q = queue();
        let log = Arc::new(Mutex::new(Vec::new()));
        q.append_task(Push(log.clone(), 1));
        q.append_tasks(vec![
            Box::new(Push(log.clone(), 2)),
            Box::new(Push(log.clone(), 3)),
        ]);
        assert_eq!(q.pending_len(), 3);

        assert_eq!(q.run_pending(), 3);
        assert_eq!(*log.lock(), vec![1, 2, 3]);
        assert_eq!(q.launched(), 3);
        assert_eq!(q.run_pending(), 0);
    }

    struct Reappend {
        queue: Arc<TaskQueue>,
        log: Arc<Mutex<Vec<u32>>>,
    }

    impl Task for Reappend {
        fn launch(&mut self) {
            self.log.lock().push(0);
            self.queue.append_task(Push(self.log.clone(), 9));
        }
    }

    #[test]
    fn appends_during_a_batch_wait_for_the_next() {
        let q = queue();
        let log = Arc::new(Mutex::new(Vec::new()));
        q.append_task(Reappend {
            queue: q.clone(),
            log: log.clone(),
        });

        assert_eq!(q.run_pending(), 1);
        assert_eq!(*log.lock(), vec![0]);
        assert_eq!(q.run_pending(), 1);
        assert_eq!(*log.lock(), vec![0, 9]);
    }

    struct HoldsLock(Arc<ReentrantMutex<()>>, Arc<AtomicBool>);

    impl Task for HoldsLock {
        fn launch(&mut self) {
            // Re-entrant on the launching thread, so this must not deadlock.
            let _again = self.0.lock();
            self.1.store(true, Ordering::Release);
        }
    }

    #[test]
    fn tasks_run_under_the_tree_lock() {
        let lock = Arc::new(ReentrantMutex::new(()));
        let q = TaskQueue::new(lock.clone());
        let flag = Arc::new(AtomicBool::new(false));
        q.append_task(HoldsLock(lock.clone(), flag.clone()));
        q.run_pending();
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn worker_drains_queue() {
        let q = queue();
        let log = Arc::new(Mutex::new(Vec::new()));
        q.spawn_worker(Duration::from_secs(2)).unwrap();
        for i in 0..10 {
            q.append_task(Push(log.clone(), i));
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while q.launched() < 10 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        q.shutdown();
        assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
        assert!(!q.is_worker_running());
    }
}
