//! Error types for the thread tree and task queue.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by threads of the tree.
#[derive(Error, Debug)]
pub enum ThreadError {
    /// The thread did not reach its run loop in time. Treated as a fatal
    /// configuration error by callers.
    #[error("thread '{name}' did not start within {timeout:?}")]
    StartTimeout { name: String, timeout: Duration },

    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("thread '{0}' is already running")]
    AlreadyRunning(String),

    #[error("thread '{0}' is not attached to a tree")]
    Detached(String),

    /// A device or sink behind the thread failed. Stops that thread's subtree.
    #[error("backend failure in '{name}': {message}")]
    Backend { name: String, message: String },

    #[error("{0}")]
    Run(String),
}

impl ThreadError {
    pub fn backend(name: impl Into<String>, message: impl ToString) -> Self {
        ThreadError::Backend {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

pub type ThreadResult<T> = Result<T, ThreadError>;
