//! Thread tree behavior: ordering, dividers, start queue, failures, overruns.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tw_thread::{
    SyncMode, Task, TaskQueue, Thread, ThreadError, ThreadResult, ThreadRun, ThreadStatus,
    ThreadTree, TreeConfig, TreeMode,
};

type Log = Arc<Mutex<Vec<&'static str>>>;

struct Recorder {
    name: &'static str,
    log: Log,
}

impl ThreadRun for Recorder {
    fn run(&mut self, _tick: u64) -> ThreadResult<()> {
        self.log.lock().push(self.name);
        Ok(())
    }
}

fn recorder(name: &'static str, log: &Log) -> Recorder {
    Recorder {
        name,
        log: log.clone(),
    }
}

fn single() -> TreeConfig {
    TreeConfig {
        mode: TreeMode::SingleThreaded,
        ..TreeConfig::default()
    }
}

#[test]
fn pre_sync_runs_before_parent_and_post_sync_after() {
    let log: Log = Arc::default();
    let tree = ThreadTree::new(single(), 100.0, recorder("root", &log));
    tree.root()
        .add_child(Thread::new("post", 100.0, recorder("post", &log)), SyncMode::PostSync);
    tree.root()
        .add_child(Thread::new("pre", 100.0, recorder("pre", &log)), SyncMode::PreSync);

    tree.start_stepped().unwrap();
    for _ in 0..3 {
        assert!(tree.step().unwrap());
    }
    tree.stop();

    assert_eq!(
        *log.lock(),
        ["pre", "root", "post", "pre", "root", "post", "pre", "root", "post"]
    );
    assert_eq!(tree.tick(), 3);
}

#[test]
fn slower_child_runs_on_divided_ticks() {
    let log: Log = Arc::default();
    let tree = ThreadTree::new(single(), 100.0, recorder("root", &log));
    let half = Thread::new("half", 50.0, recorder("half", &log));
    tree.root().add_child(half.clone(), SyncMode::PreSync);

    tree.start_stepped().unwrap();
    for _ in 0..4 {
        tree.step().unwrap();
    }
    assert_eq!(half.ticks(), 2);
    assert_eq!(tree.root().ticks(), 4);
}

#[test]
fn frequency_is_clamped_to_max_precision() {
    let log: Log = Arc::default();
    let config = TreeConfig {
        max_precision: 500.0,
        ..single()
    };
    let tree = ThreadTree::new(config, 2000.0, recorder("root", &log));
    assert_eq!(tree.root().frequency(), 500.0);

    let child = Thread::new("child", 4000.0, recorder("child", &log));
    tree.root().add_child(child.clone(), SyncMode::PreSync);
    assert_eq!(child.frequency(), 500.0);
}

#[test]
fn start_queue_attaches_on_next_tick() {
    let log: Log = Arc::default();
    let tree = ThreadTree::new(single(), 100.0, recorder("root", &log));
    tree.start_stepped().unwrap();
    tree.step().unwrap();

    let voice = Thread::new("voice", 100.0, recorder("voice", &log));
    tree.root().add_start_queue(voice.clone(), SyncMode::PreSync);
    assert!(tree.root().is_queued(&voice));
    assert_eq!(voice.status(), ThreadStatus::Idle);

    tree.step().unwrap();
    assert!(!tree.root().is_queued(&voice));
    assert!(voice.is_running());
    assert_eq!(voice.ticks(), 1);
    assert_eq!(tree.root().children().len(), 1);
}

#[test]
fn start_queue_defers_while_tree_is_locked() {
    let log: Log = Arc::default();
    let tree = ThreadTree::new(single(), 100.0, recorder("root", &log));
    tree.start_stepped().unwrap();

    let voice = Thread::new("voice", 100.0, recorder("voice", &log));
    tree.root().add_start_queue(voice.clone(), SyncMode::PreSync);

    let lock = tree.lock_handle();
    let (locked_tx, locked_rx) = crossbeam_channel::bounded::<()>(0);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let holder = std::thread::spawn(move || {
        let _guard = lock.lock();
        locked_tx.send(()).unwrap();
        release_rx.recv().unwrap();
    });

    locked_rx.recv().unwrap();
    tree.step().unwrap();
    assert!(tree.root().is_queued(&voice));

    release_tx.send(()).unwrap();
    holder.join().unwrap();
    tree.step().unwrap();
    assert!(voice.is_running());
}

struct FailOn {
    tick: u64,
    stops: Arc<AtomicU32>,
    ran: u64,
}

impl ThreadRun for FailOn {
    fn run(&mut self, _tick: u64) -> ThreadResult<()> {
        self.ran += 1;
        if self.ran == self.tick {
            return Err(ThreadError::backend("device", "device lost"));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn failure_stops_only_the_subtree() {
    let log: Log = Arc::default();
    let stops = Arc::new(AtomicU32::new(0));
    let tree = ThreadTree::new(single(), 100.0, recorder("root", &log));

    let failing = Thread::new(
        "soundcard",
        100.0,
        FailOn {
            tick: 2,
            stops: stops.clone(),
            ran: 0,
        },
    );
    let export = Thread::new("export", 100.0, recorder("export", &log));
    failing.add_child(export.clone(), SyncMode::PostSync);
    let sibling = Thread::new("sibling", 100.0, recorder("sibling", &log));
    tree.root().add_child(failing.clone(), SyncMode::PostSync);
    tree.root().add_child(sibling.clone(), SyncMode::PostSync);

    tree.start_stepped().unwrap();
    for _ in 0..4 {
        assert!(tree.step().unwrap());
    }

    assert_eq!(failing.status(), ThreadStatus::Failed);
    assert_eq!(export.status(), ThreadStatus::Stopped);
    assert!(sibling.is_running());
    assert!(tree.root().is_running());
    assert_eq!(sibling.ticks(), 4);
    assert_eq!(export.ticks(), 1);
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    // The failed child is pruned on the next tick.
    assert_eq!(tree.root().children().len(), 1);

    tree.stop();
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[test]
fn threaded_children_follow_the_root() {
    let log: Log = Arc::default();
    let tree = ThreadTree::new(TreeConfig::default(), 500.0, recorder("root", &log));
    let child = Thread::new("audio-loop", 500.0, recorder("child", &log));
    tree.root().add_child(child.clone(), SyncMode::PreSync);

    tree.start().unwrap();
    std::thread::sleep(Duration::from_millis(60));
    tree.stop();

    assert_eq!(tree.root().status(), ThreadStatus::Stopped);
    assert_eq!(child.status(), ThreadStatus::Stopped);
    assert!(child.ticks() > 0);
    assert!(child.ticks() <= tree.root().ticks());
}

struct Slow(Duration);

impl ThreadRun for Slow {
    fn run(&mut self, _tick: u64) -> ThreadResult<()> {
        std::thread::sleep(self.0);
        Ok(())
    }
}

#[test]
fn busy_pre_sync_child_counts_overruns() {
    let log: Log = Arc::default();
    let tree = ThreadTree::new(TreeConfig::default(), 1000.0, recorder("root", &log));
    let slow = Thread::new("slow", 1000.0, Slow(Duration::from_millis(30)));
    tree.root().add_child(slow.clone(), SyncMode::PreSync);

    tree.start_stepped().unwrap();
    tree.step().unwrap();
    tree.step().unwrap();
    tree.stop();

    assert!(tree.root().overruns() >= 1);
    assert_eq!(slow.status(), ThreadStatus::Stopped);
}

struct QueueVoice {
    parent: Arc<Thread>,
    voice: Arc<Thread>,
}

impl Task for QueueVoice {
    fn launch(&mut self) {
        self.parent.add_start_queue(self.voice.clone(), SyncMode::PreSync);
    }
}

#[test]
fn task_hands_a_voice_to_the_running_tree() {
    let log: Log = Arc::default();
    let tree = ThreadTree::new(TreeConfig::default(), 500.0, recorder("root", &log));
    let queue = TaskQueue::new(tree.lock_handle());
    queue.spawn_worker(Duration::from_secs(2)).unwrap();
    tree.start().unwrap();

    let voice = Thread::new("voice", 500.0, recorder("voice", &log));
    queue.append_task(QueueVoice {
        parent: tree.root().clone(),
        voice: voice.clone(),
    });

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while voice.ticks() == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    tree.stop();
    queue.shutdown();

    assert!(voice.ticks() > 0);
    assert_eq!(voice.status(), ThreadStatus::Stopped);
}
