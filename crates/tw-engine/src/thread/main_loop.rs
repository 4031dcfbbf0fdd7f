use std::sync::{Arc, OnceLock};

use tw_thread::{TaskQueue, ThreadResult, ThreadRun};

/// Root runner of the engine tree.
///
/// With an inline task queue every tick first launches the pending batch,
/// so graph mutations land between two audio ticks. The queue can be
/// attached after the tree exists through [`inline_slot`](Self::inline_slot),
/// since the queue needs the tree's lock.
pub struct MainLoop {
    tasks: Arc<OnceLock<Arc<TaskQueue>>>,
}

impl MainLoop {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(OnceLock::new()),
        }
    }

    pub fn with_inline_tasks(tasks: Arc<TaskQueue>) -> Self {
        let main = Self::new();
        let _ = main.tasks.set(tasks);
        main
    }

    pub fn inline_slot(&self) -> Arc<OnceLock<Arc<TaskQueue>>> {
        self.tasks.clone()
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRun for MainLoop {
    fn run(&mut self, _tick: u64) -> ThreadResult<()> {
        if let Some(tasks) = self.tasks.get() {
            tasks.run_pending();
        }
        Ok(())
    }
}
