//! The thread tree: a root main loop, its configuration and the
//! structural lock shared with the task queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::error::{ThreadError, ThreadResult};
use crate::thread::{Thread, ThreadRun};

/// Default bounded wait for a thread to reach its run loop.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound for any node's tick frequency.
pub const DEFAULT_MAX_PRECISION: f64 = 1000.0;

/// How children of the tree are driven.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TreeMode {
    /// One OS thread per node.
    #[default]
    Threaded,
    /// Only the root owns an OS thread; children are ticked inline.
    SingleThreaded,
}

#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub mode: TreeMode,
    pub start_timeout: Duration,
    pub max_precision: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            mode: TreeMode::Threaded,
            start_timeout: DEFAULT_START_TIMEOUT,
            max_precision: DEFAULT_MAX_PRECISION,
        }
    }
}

/// State every node of one tree can reach.
pub struct TreeShared {
    pub(crate) config: TreeConfig,
    pub(crate) lock: Arc<ReentrantMutex<()>>,
    pub(crate) tick: AtomicU64,
}

/// Root of a thread tree.
///
/// The root node is the main loop. It owns the monotonic tick counter and
/// fans each tick out to its children.
pub struct ThreadTree {
    shared: Arc<TreeShared>,
    root: Arc<Thread>,
}

impl ThreadTree {
    pub fn new(config: TreeConfig, frequency: f64, root_runner: impl ThreadRun + 'static) -> Self {
        let frequency = frequency.min(config.max_precision);
        let shared = Arc::new(TreeShared {
            config,
            lock: Arc::new(ReentrantMutex::new(())),
            tick: AtomicU64::new(0),
        });
        let root = Thread::new("main-loop", frequency, root_runner);
        root.attach_subtree(&shared);
        Self { shared, root }
    }

    pub fn root(&self) -> &Arc<Thread> {
        &self.root
    }

    pub fn config(&self) -> &TreeConfig {
        &self.shared.config
    }

    pub fn mode(&self) -> TreeMode {
        self.shared.config.mode
    }

    /// Ticks the main loop has started.
    pub fn tick(&self) -> u64 {
        self.shared.tick.load(Ordering::Acquire)
    }

    /// Take the structural lock. Re-entrant on the same OS thread.
    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.shared.lock.lock()
    }

    /// Handle to the structural lock for holders that outlive a borrow of the tree.
    pub fn lock_handle(&self) -> Arc<ReentrantMutex<()>> {
        self.shared.lock.clone()
    }

    /// Spawn the main loop (and, in threaded mode, every child) and wait
    /// for all of them to enter their run loops.
    pub fn start(&self) -> ThreadResult<()> {
        log::info!(target: "thread", "starting thread tree ({:?})", self.mode());
        self.root.start_node(true)
    }

    /// Mark the tree running without a main loop thread; ticks are then
    /// driven by [`step`](Self::step). Threaded children still get their
    /// own OS threads.
    pub fn start_stepped(&self) -> ThreadResult<()> {
        self.root.start_node(false)
    }

    /// Run one main loop tick on the calling thread.
    ///
    /// Returns `Ok(false)` once the root has stopped.
    pub fn step(&self) -> ThreadResult<bool> {
        if !self.root.is_running() {
            return Ok(false);
        }
        if self.root.has_os_thread() {
            return Err(ThreadError::AlreadyRunning(self.root.name().to_string()));
        }
        let tick = self.shared.tick.fetch_add(1, Ordering::AcqRel) + 1;
        let alive = self.root.tick_once(tick);
        if !alive {
            self.root.finish();
        }
        Ok(alive)
    }

    /// Stop every node and wait for their threads.
    pub fn stop(&self) {
        log::info!(target: "thread", "stopping thread tree after {} ticks", self.tick());
        self.root.stop();
    }
}

impl Drop for ThreadTree {
    fn drop(&mut self) {
        if self.root.is_running() {
            self.root.stop();
        }
    }
}
