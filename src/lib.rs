//! Single-shot continuations between a producer and a consumer.
//!
//! A [`Promise`] creates a shared result cell and hands out exactly one
//! [`Future`]. The consumer registers a callback with [`Future::then_value`],
//! optionally binds an [`Executor`] with [`Future::via`], and finally consumes
//! the future with [`Future::get`]. The callback then runs with the value the
//! producer supplied through [`Promise::set_value`]: inline on the caller's
//! thread, or on one of the executor's workers.
//!
//! [`BlockingQueue`] is the bounded, blocking hand-off queue built on top of
//! [`RingBuffer`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::mpsc::channel;
//! use tiny_future::{Promise, ThreadPoolExecutor};
//!
//! let pool = Arc::new(ThreadPoolExecutor::new(2));
//! let (tx, rx) = channel();
//!
//! let mut promise = Promise::<String>::new();
//! let mut future = promise.get_future().unwrap();
//! future.via(pool.clone());
//! future.then_value(move |value| tx.send(value).unwrap());
//! promise.set_value("Kitty1".into());
//! future.get().unwrap();
//!
//! assert_eq!(rx.recv().unwrap(), "Kitty1");
//! pool.wait_and_stop();
//! ```

pub mod blocking_queue;
pub mod executor;
pub mod future;
pub mod promise;
pub mod ring_buffer;
mod shared_state;
pub mod thread_pool;

pub use blocking_queue::BlockingQueue;
pub use executor::{Executor, InlineExecutor, Task};
pub use future::Future;
pub use promise::{promise, Promise};
pub use ring_buffer::RingBuffer;
pub use thread_pool::{ThreadPoolBuilder, ThreadPoolExecutor};

use thiserror::Error;

/// Recoverable failures. Misuse such as calling [`Future::get`] before a
/// value was set panics instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
    #[error("a thread pool needs at least one worker thread")]
    ZeroThreads,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("executor has been shut down")]
    ExecutorShutdown,
    #[error("the future of this promise was already retrieved")]
    FutureAlreadyRetrieved,
}
