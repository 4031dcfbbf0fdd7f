//! Tree nodes: one schedulable unit with a target tick frequency.
//!
//! A node runs its [`ThreadRun`] once per tick. Children are dispatched by
//! their parent every tick, either before the parent's own run (pre-sync)
//! or after it (post-sync). A child with a lower frequency than its parent
//! is only dispatched every `parent_freq / child_freq` parent ticks.
//!
//! In threaded mode every child has its own OS thread parked on a tick gate;
//! the parent opens the gate and, for pre-sync children, waits (bounded) for
//! the tick to complete. In single-thread mode the parent calls the child's
//! tick inline. Both paths share [`Thread::dispatch`].

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::clock::{period_of, TickClock, Wake};
use crate::error::{ThreadError, ThreadResult};
use crate::telemetry::{TelemetrySummary, TickTelemetry};
use crate::tree::{TreeMode, TreeShared};

/// Work done by a thread on every tick.
pub trait ThreadRun: Send {
    /// Called once before the first tick.
    fn start(&mut self) -> ThreadResult<()> {
        Ok(())
    }

    /// One tick. An error stops this thread and its subtree.
    fn run(&mut self, tick: u64) -> ThreadResult<()>;

    /// Called once after the last tick, including after a failed tick.
    fn stop(&mut self) {}
}

/// Whether a child ticks before or after its parent's own run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    PreSync,
    PostSync,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadStatus {
    Idle = 0,
    Running = 1,
    Stopped = 2,
    Failed = 3,
}

impl ThreadStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ThreadStatus::Running,
            2 => ThreadStatus::Stopped,
            3 => ThreadStatus::Failed,
            _ => ThreadStatus::Idle,
        }
    }
}

#[derive(Default)]
struct Gate {
    dispatched: u64,
    completed: u64,
}

/// A node of the thread tree.
pub struct Thread {
    name: String,
    frequency: AtomicU64,
    sync: AtomicU8,
    status: AtomicU8,
    stop_requested: AtomicBool,
    finished: AtomicBool,
    tree: OnceLock<Arc<TreeShared>>,
    parent: Mutex<Weak<Thread>>,
    children: Mutex<Vec<Arc<Thread>>>,
    start_queue: Mutex<Vec<(Arc<Thread>, SyncMode)>>,
    runner: Mutex<Box<dyn ThreadRun>>,
    started: Mutex<bool>,
    started_cv: Condvar,
    gate: Mutex<Gate>,
    gate_cv: Condvar,
    countdown: AtomicU32,
    ticks: AtomicU64,
    telemetry: Mutex<TickTelemetry>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Thread {
    /// Create a detached node. Attach it with [`add_child`](Self::add_child)
    /// or [`add_start_queue`](Self::add_start_queue).
    pub fn new(name: impl Into<String>, frequency: f64, runner: impl ThreadRun + 'static) -> Arc<Self> {
        Arc::new(Self::build(name.into(), frequency, Box::new(runner)))
    }

    pub(crate) fn build(name: String, frequency: f64, runner: Box<dyn ThreadRun>) -> Self {
        Self {
            name,
            frequency: AtomicU64::new(frequency.to_bits()),
            sync: AtomicU8::new(SyncMode::PreSync as u8),
            status: AtomicU8::new(ThreadStatus::Idle as u8),
            stop_requested: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            tree: OnceLock::new(),
            parent: Mutex::new(Weak::new()),
            children: Mutex::new(Vec::new()),
            start_queue: Mutex::new(Vec::new()),
            runner: Mutex::new(runner),
            started: Mutex::new(false),
            started_cv: Condvar::new(),
            gate: Mutex::new(Gate::default()),
            gate_cv: Condvar::new(),
            countdown: AtomicU32::new(0),
            ticks: AtomicU64::new(0),
            telemetry: Mutex::new(TickTelemetry::new()),
            handle: Mutex::new(None),
        }
    }

    // --- Accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frequency(&self) -> f64 {
        f64::from_bits(self.frequency.load(Ordering::Relaxed))
    }

    /// Change the tick rate. Clamped to the tree's maximum precision once attached.
    pub fn set_frequency(&self, frequency: f64) {
        let frequency = match self.tree.get() {
            Some(tree) => frequency.min(tree.config.max_precision),
            None => frequency,
        };
        self.frequency.store(frequency.to_bits(), Ordering::Relaxed);
    }

    pub fn sync_mode(&self) -> SyncMode {
        if self.sync.load(Ordering::Relaxed) == SyncMode::PostSync as u8 {
            SyncMode::PostSync
        } else {
            SyncMode::PreSync
        }
    }

    pub fn status(&self) -> ThreadStatus {
        ThreadStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.status() == ThreadStatus::Running
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Ticks this node has executed.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Ticks that overran their budget or were still pending when the next arrived.
    pub fn overruns(&self) -> u64 {
        self.telemetry.lock().overruns()
    }

    pub fn telemetry_summary(&self) -> TelemetrySummary {
        self.telemetry.lock().take_summary()
    }

    pub fn parent(&self) -> Option<Arc<Thread>> {
        self.parent.lock().upgrade()
    }

    pub fn children(&self) -> Vec<Arc<Thread>> {
        self.children.lock().clone()
    }

    /// Whether `child` waits in this node's start queue.
    pub fn is_queued(&self, child: &Arc<Thread>) -> bool {
        self.start_queue.lock().iter().any(|(t, _)| Arc::ptr_eq(t, child))
    }

    pub fn start_queue_len(&self) -> usize {
        self.start_queue.lock().len()
    }

    pub(crate) fn has_os_thread(&self) -> bool {
        self.handle.lock().is_some()
    }

    fn mode(&self) -> TreeMode {
        self.tree.get().map_or(TreeMode::Threaded, |t| t.config.mode)
    }

    // --- Tree structure ---

    /// Attach `child` now. It is not started; a running parent starts
    /// children through its start queue instead.
    pub fn add_child(self: &Arc<Self>, child: Arc<Thread>, sync: SyncMode) {
        self.adopt(&child, sync);
        let mut children = self.children.lock();
        if !children.iter().any(|c| Arc::ptr_eq(c, &child)) {
            children.push(child);
        }
    }

    /// Queue `child` to be attached and started by this node at its next tick.
    pub fn add_start_queue(self: &Arc<Self>, child: Arc<Thread>, sync: SyncMode) {
        self.adopt(&child, sync);
        let mut queue = self.start_queue.lock();
        if !queue.iter().any(|(t, _)| Arc::ptr_eq(t, &child)) {
            log::debug!(target: "thread", "{} queued for start under {}", child.name, self.name);
            queue.push((child, sync));
        }
    }

    fn adopt(self: &Arc<Self>, child: &Arc<Thread>, sync: SyncMode) {
        if let Some(tree) = self.tree.get() {
            child.attach_subtree(tree);
        }
        child.sync.store(sync as u8, Ordering::Relaxed);
        *child.parent.lock() = Arc::downgrade(self);
    }

    /// Attach this node and everything below it to `tree`.
    pub(crate) fn attach_subtree(&self, tree: &Arc<TreeShared>) {
        let _ = self.tree.set(tree.clone());
        let max = tree.config.max_precision;
        if self.frequency() > max {
            self.frequency.store(max.to_bits(), Ordering::Relaxed);
        }
        for child in self.children() {
            child.attach_subtree(tree);
        }
        let queued: Vec<Arc<Thread>> = self.start_queue.lock().iter().map(|(t, _)| t.clone()).collect();
        for child in queued {
            child.attach_subtree(tree);
        }
    }

    /// Detach `child` without stopping it.
    pub fn remove_child(&self, child: &Arc<Thread>) {
        self.children.lock().retain(|c| !Arc::ptr_eq(c, child));
        self.start_queue.lock().retain(|(c, _)| !Arc::ptr_eq(c, child));
    }

    // --- Start ---

    /// Start this node and every attached child.
    ///
    /// In threaded mode this spawns an OS thread per node and blocks until
    /// each one has entered its run loop, or fails with
    /// [`ThreadError::StartTimeout`].
    pub fn start(self: &Arc<Self>) -> ThreadResult<()> {
        let spawn = self.mode() == TreeMode::Threaded;
        self.start_node(spawn)
    }

    pub(crate) fn start_node(self: &Arc<Self>, spawn: bool) -> ThreadResult<()> {
        let tree = self
            .tree
            .get()
            .cloned()
            .ok_or_else(|| ThreadError::Detached(self.name.clone()))?;

        if self.status() != ThreadStatus::Running {
            self.stop_requested.store(false, Ordering::Release);
            self.finished.store(false, Ordering::Release);
            if let Err(e) = self.runner.lock().start() {
                self.status.store(ThreadStatus::Failed as u8, Ordering::Release);
                return Err(e);
            }

            if spawn {
                self.spawn(tree.config.start_timeout)?;
            } else {
                self.status.store(ThreadStatus::Running as u8, Ordering::Release);
            }
            log::debug!(target: "thread", "started {} ({:.1} Hz)", self.name, self.frequency());
        }

        let child_spawn = tree.config.mode == TreeMode::Threaded;
        for child in self.children() {
            child.start_node(child_spawn)?;
        }
        Ok(())
    }

    fn spawn(self: &Arc<Self>, timeout: Duration) -> ThreadResult<()> {
        *self.started.lock() = false;
        self.status.store(ThreadStatus::Running as u8, Ordering::Release);

        let node = self.clone();
        let is_root = self.parent().is_none();
        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                if is_root {
                    node.root_loop();
                } else {
                    node.child_loop();
                }
            })
            .map_err(|source| {
                self.status.store(ThreadStatus::Failed as u8, Ordering::Release);
                ThreadError::Spawn {
                    name: self.name.clone(),
                    source,
                }
            })?;
        *self.handle.lock() = Some(handle);

        let mut started = self.started.lock();
        if !*started {
            let _ = self
                .started_cv
                .wait_while_for(&mut started, |s| !*s, timeout);
        }
        if !*started {
            drop(started);
            log::error!(target: "thread", "{} did not start within {:?}", self.name, timeout);
            self.request_stop();
            return Err(ThreadError::StartTimeout {
                name: self.name.clone(),
                timeout,
            });
        }
        Ok(())
    }

    fn announce_started(&self) {
        let mut started = self.started.lock();
        *started = true;
        self.started_cv.notify_all();
    }

    // --- Run loops ---

    fn root_loop(self: Arc<Self>) {
        self.announce_started();
        let mut clock = TickClock::new(self.frequency());

        while !self.is_stop_requested() {
            if clock.wait() == Wake::Resynced {
                log::warn!(target: "thread", "{} fell behind, resynchronizing clock", self.name);
                self.telemetry.lock().count_overrun();
            }
            if self.is_stop_requested() {
                break;
            }
            let tick = match self.tree.get() {
                Some(tree) => tree.tick.fetch_add(1, Ordering::AcqRel) + 1,
                None => self.ticks() + 1,
            };
            if !self.tick_once(tick) {
                break;
            }
            let frequency = self.frequency();
            if clock.period() != period_of(frequency) {
                clock.set_frequency(frequency);
            }
        }
        self.finish();
    }

    fn child_loop(self: Arc<Self>) {
        self.announce_started();

        loop {
            {
                let mut gate = self.gate.lock();
                while gate.completed == gate.dispatched && !self.is_stop_requested() {
                    self.gate_cv.wait(&mut gate);
                }
                if self.is_stop_requested() {
                    break;
                }
                if gate.dispatched - gate.completed > 1 {
                    self.telemetry.lock().count_overrun();
                }
            }

            let ok = self.tick_once(self.ticks() + 1);
            {
                let mut gate = self.gate.lock();
                gate.completed += 1;
                self.gate_cv.notify_all();
            }
            if !ok {
                break;
            }
        }
        self.finish();
    }

    /// Execute one tick of this node: start queued children, dispatch
    /// pre-sync children, run, dispatch post-sync children.
    ///
    /// Returns `false` once the node has stopped.
    pub(crate) fn tick_once(self: &Arc<Self>, tick: u64) -> bool {
        if self.is_stop_requested() {
            return false;
        }
        let began = Instant::now();

        self.start_queued();
        let children = self.prune_children();

        let pre: Vec<&Arc<Thread>> = children
            .iter()
            .filter(|c| c.sync_mode() == SyncMode::PreSync)
            .collect();
        let dispatched: Vec<(&Arc<Thread>, u64)> = pre
            .iter()
            .filter_map(|c| self.dispatch(c, tick).map(|target| (*c, target)))
            .collect();
        for (child, target) in dispatched {
            self.await_child(child, target);
        }

        let result = self.runner.lock().run(tick);
        if let Err(e) = result {
            log::error!(target: "thread", "{} stopped: {}", self.name, e);
            self.status.store(ThreadStatus::Failed as u8, Ordering::Release);
            self.request_stop();
            return false;
        }

        for child in children.iter().filter(|c| c.sync_mode() == SyncMode::PostSync) {
            self.dispatch(child, tick);
        }

        self.ticks.fetch_add(1, Ordering::Relaxed);
        let budget = period_of(self.frequency());
        if self.telemetry.lock().record(began.elapsed(), budget) {
            log::trace!(target: "thread", "{} overran tick {}", self.name, tick);
        }
        true
    }

    /// Hand one tick to `child` if its divider allows it.
    ///
    /// Inline children run to completion here and `None` is returned.
    /// Threaded children get their gate opened; the returned target is the
    /// completion count to wait for.
    fn dispatch(&self, child: &Arc<Thread>, tick: u64) -> Option<u64> {
        if child.is_stop_requested() {
            // An inline child that asked to stop has no loop of its own to finish it.
            if !child.has_os_thread() {
                child.finish();
            }
            return None;
        }
        if !child.is_running() {
            return None;
        }

        let every = divider(self.frequency(), child.frequency());
        let remaining = child.countdown.load(Ordering::Relaxed);
        if remaining > 1 {
            child.countdown.store(remaining - 1, Ordering::Relaxed);
            return None;
        }
        child.countdown.store(every, Ordering::Relaxed);

        if !child.has_os_thread() {
            if !child.tick_once(tick) {
                child.finish();
            }
            return None;
        }

        let mut gate = child.gate.lock();
        gate.dispatched += 1;
        let target = gate.dispatched;
        child.gate_cv.notify_all();
        Some(target)
    }

    /// Wait for a threaded child to complete the tick it was handed.
    fn await_child(&self, child: &Arc<Thread>, target: u64) {
        let timeout = sync_timeout(self.frequency());
        let mut gate = child.gate.lock();
        let result = child.gate_cv.wait_while_for(
            &mut gate,
            |g| g.completed < target && !child.is_stop_requested(),
            timeout,
        );
        if result.timed_out() && gate.completed < target {
            drop(gate);
            log::trace!(target: "thread", "{} still busy after {:?}", child.name, timeout);
            self.telemetry.lock().count_overrun();
        }
    }

    fn start_queued(self: &Arc<Self>) {
        if self.start_queue.lock().is_empty() {
            return;
        }
        let Some(tree) = self.tree.get() else {
            return;
        };
        // A task holding the tree lock defers queued starts to the next tick.
        let Some(_guard) = tree.lock.try_lock() else {
            return;
        };

        let queued: Vec<(Arc<Thread>, SyncMode)> = std::mem::take(&mut *self.start_queue.lock());
        let spawn = tree.config.mode == TreeMode::Threaded;
        for (child, sync) in queued {
            self.add_child(child.clone(), sync);
            if let Err(e) = child.start_node(spawn) {
                log::error!(target: "thread", "failed to start {}: {}", child.name, e);
                child.shutdown();
                self.remove_child(&child);
            }
        }
    }

    /// Drop children that have stopped and return the live ones.
    fn prune_children(&self) -> Vec<Arc<Thread>> {
        let mut stopped = Vec::new();
        let live = {
            let mut children = self.children.lock();
            children.retain(|c| {
                let done = matches!(c.status(), ThreadStatus::Stopped | ThreadStatus::Failed);
                if done {
                    stopped.push(c.clone());
                }
                !done
            });
            children.clone()
        };
        for child in stopped {
            child.join();
        }
        live
    }

    // --- Stop ---

    /// Ask this node and its subtree to stop at the next tick boundary.
    /// Does not wait.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        {
            let _gate = self.gate.lock();
            self.gate_cv.notify_all();
        }
        for child in self.children() {
            child.request_stop();
        }
        for (child, _) in self.start_queue.lock().iter() {
            child.request_stop();
        }
    }

    /// Stop this node and its subtree and wait for their threads to exit.
    pub fn stop(&self) {
        self.request_stop();
        self.shutdown();
    }

    fn shutdown(&self) {
        for child in self.children() {
            child.shutdown();
        }
        if self.handle.lock().is_some() {
            self.join();
        } else {
            self.finish();
        }
    }

    fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!(target: "thread", "{} panicked", self.name);
            }
        }
    }

    /// Final transition, run once per start.
    pub(crate) fn finish(&self) {
        if self.status() == ThreadStatus::Idle || self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.status() != ThreadStatus::Failed {
            self.status.store(ThreadStatus::Stopped as u8, Ordering::Release);
        }

        self.request_stop();
        for child in self.children() {
            child.shutdown();
        }
        self.runner.lock().stop();
        {
            let _gate = self.gate.lock();
            self.gate_cv.notify_all();
        }
        log::debug!(target: "thread", "{} finished after {} ticks", self.name, self.ticks());
    }
}

/// Parent ticks between two dispatches of a child.
fn divider(parent_frequency: f64, child_frequency: f64) -> u32 {
    if child_frequency <= 0.0 || parent_frequency <= child_frequency {
        return 1;
    }
    (parent_frequency / child_frequency).round().max(1.0) as u32
}

/// How long a parent waits for a pre-sync child before counting an overrun.
fn sync_timeout(parent_frequency: f64) -> Duration {
    (period_of(parent_frequency) * 2).max(Duration::from_millis(5))
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("frequency", &self.frequency())
            .field("status", &self.status())
            .field("ticks", &self.ticks())
            .finish()
    }
}
