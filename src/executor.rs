//! Where and how a continuation runs.
//!
//! An [`Executor`] accepts zero-argument [`Task`]s. [`Future::via`](crate::Future::via)
//! binds one to a future so the callback runs on the executor instead of on
//! the thread calling [`Future::get`](crate::Future::get).
//! [`ThreadPoolExecutor`](crate::ThreadPoolExecutor) is the worker pool
//! implementation; [`InlineExecutor`] runs each task right away on the
//! submitting thread.

use crate::Error;

/// A boxed closure that can be moved to another thread and run once.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    /// Queues `task` for execution.
    ///
    /// Fails with [`Error::ExecutorShutdown`] if the executor no longer
    /// accepts work. The task is dropped unrun in that case.
    fn submit(&self, task: Task) -> Result<(), Error>;
}

/// Runs every submitted task synchronously inside [`Executor::submit`].
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn submit(&self, task: Task) -> Result<(), Error> {
        task();
        Ok(())
    }
}
