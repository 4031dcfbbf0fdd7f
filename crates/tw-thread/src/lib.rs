//! Scheduling core for tickwork.
//!
//! A tree of tick-driven threads rooted at a main loop, plus the task queue
//! that serializes graph mutations against it. Nodes either own an OS thread
//! or are ticked inline by their parent, selected by [`TreeMode`].

mod clock;
mod error;
mod task;
mod telemetry;
mod thread;
mod tree;

pub use clock::{period_of, TickClock, Wake};
pub use error::{ThreadError, ThreadResult};
pub use task::{Task, TaskQueue};
pub use telemetry::{TelemetrySummary, TickTelemetry};
pub use thread::{SyncMode, Thread, ThreadRun, ThreadStatus};
pub use tree::{ThreadTree, TreeConfig, TreeMode, DEFAULT_MAX_PRECISION, DEFAULT_START_TIMEOUT};
