//! A fixed-size pool of worker threads fed from one FIFO task queue.
//!
//! Workers block until a task is queued or shutdown is requested. Each task
//! runs outside the queue lock. Shutdown through
//! [`ThreadPoolExecutor::wait_and_stop`] (also run on drop) lets the workers
//! drain whatever is already queued before they exit, and rejects anything
//! submitted afterwards with [`Error::ExecutorShutdown`].
//!
//! A panic inside a task is caught at the worker boundary: it is logged,
//! counted in [`ThreadPoolExecutor::panicked_tasks`], and the worker moves on
//! to the next task.

use crate::executor::{Executor, Task};
use crate::Error;
use std::{
    any::Any,
    cell::Cell,
    collections::VecDeque,
    fmt::{self, Debug},
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Condvar, Mutex,
    },
    thread::{self, JoinHandle},
};

/// Worker count used when [`std::thread::available_parallelism`] fails.
const FALLBACK_THREADS: usize = 8;

thread_local! {
    /// Address of the `Shared` of the pool this thread works for, 0 otherwise.
    static CURRENT_POOL: Cell<usize> = const { Cell::new(0) };
}

struct Shared {
    tasks: Mutex<VecDeque<Task>>,
    available: Condvar,
    terminate: AtomicBool,
    in_flight: AtomicUsize,
    panicked: AtomicUsize,
    lifecycle: Mutex<Lifecycle>,
    exited: Condvar,
}

#[derive(Default)]
struct Lifecycle {
    /// Workers whose `run` has not returned yet.
    live: usize,
    /// Workers currently blocked inside `wait_and_stop` from one of their tasks.
    stopping: usize,
}

/// Decrements the live worker count when a worker leaves `run`, however it leaves.
struct ExitGuard<'a>(&'a Shared);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        let mut lifecycle = self
            .0
            .lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        lifecycle.live -= 1;
        drop(lifecycle);
        self.0.exited.notify_all();
    }
}

impl Shared {
    fn run(self: Arc<Self>, name: String) {
        let _exit = ExitGuard(&self);
        CURRENT_POOL.with(|pool| pool.set(Arc::as_ptr(&self) as usize));
        log::trace!("worker '{name}' starting");
        while let Some(task) = self.next_task() {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let outcome = panic::catch_unwind(AssertUnwindSafe(task));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if let Err(payload) = outcome {
                self.panicked.fetch_add(1, Ordering::SeqCst);
                log::error!(
                    "task panicked on worker '{name}': {}",
                    panic_message(&*payload)
                );
            }
        }
        log::trace!("worker '{name}' exiting");
    }

    /// Blocks until a task is queued, or returns `None` once termination was
    /// requested and the queue is empty.
    fn next_task(&self) -> Option<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        loop {
            if let Some(task) = tasks.pop_front() {
                return Some(task);
            }
            if self.terminate.load(Ordering::Acquire) {
                return None;
            }
            tasks = self.available.wait(tasks).unwrap();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// A worker pool implementing [`Executor`].
///
/// Share it behind an [`Arc`] to bind futures to it with
/// [`Future::via`](crate::Future::via).
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use tiny_future::ThreadPoolExecutor;
///
/// let pool = ThreadPoolExecutor::new(2);
/// let counter = Arc::new(AtomicUsize::new(0));
/// for _ in 0..8 {
///     let counter = counter.clone();
///     pool.execute(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     })
///     .unwrap();
/// }
/// pool.wait_and_stop();
/// assert_eq!(counter.load(Ordering::SeqCst), 8);
/// ```
pub struct ThreadPoolExecutor {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl ThreadPoolExecutor {
    /// Spawns a pool of `num_threads` workers named `worker-0`, `worker-1`, ...
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is 0 or a worker thread cannot be spawned. Use
    /// [`ThreadPoolExecutor::builder`] to get those failures as an [`Error`].
    pub fn new(num_threads: usize) -> Self {
        assert_ne!(num_threads, 0, "a thread pool needs at least one worker thread");
        Self::builder()
            .num_threads(num_threads)
            .build()
            .expect("spawn worker threads")
    }

    /// Spawns one worker per logical CPU, or 8 if that cannot be determined.
    pub fn with_default_threads() -> Self {
        Self::new(default_num_threads())
    }

    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::default()
    }

    /// Boxes `f` and submits it.
    pub fn execute<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(f))
    }

    /// Requests termination and waits for every worker to exit.
    ///
    /// Returns once all tasks queued before the call have finished running,
    /// for every caller, including concurrent ones and repeated calls.
    /// Tasks submitted after this point are rejected. When invoked from one
    /// of the pool's own tasks, the calling worker is not waited for: its
    /// own task is still running, and it exits on its own afterwards.
    pub fn wait_and_stop(&self) {
        {
            let _tasks = self.shared.tasks.lock().unwrap();
            self.shared.terminate.store(true, Ordering::Release);
        }
        self.shared.available.notify_all();

        // A worker must not join its peers: they may be blocked here too,
        // waiting for it. It leaves the handles to an outside caller.
        let on_worker = self.is_own_worker();
        if !on_worker {
            let workers = std::mem::take(&mut *self.workers.lock().unwrap());
            if !workers.is_empty() {
                log::debug!("stopping thread pool with {} workers", workers.len());
            }
            for worker in workers {
                if worker.join().is_err() {
                    log::error!("worker thread terminated abnormally");
                }
            }
        }

        // Callers that found no handles to join still wait for every worker
        // not itself blocked in here to exit.
        let mut lifecycle = self.shared.lifecycle.lock().unwrap();
        if on_worker {
            lifecycle.stopping += 1;
            self.shared.exited.notify_all();
        }
        let mut lifecycle = self
            .shared
            .exited
            .wait_while(lifecycle, |lifecycle| lifecycle.live > lifecycle.stopping)
            .unwrap();
        if on_worker {
            lifecycle.stopping -= 1;
        }
    }

    fn is_own_worker(&self) -> bool {
        CURRENT_POOL.with(|pool| pool.get()) == Arc::as_ptr(&self.shared) as usize
    }

    /// Number of tasks currently executing.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Number of tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared.tasks.lock().unwrap().len()
    }

    /// Number of tasks that panicked since the pool started.
    pub fn panicked_tasks(&self) -> usize {
        self.shared.panicked.load(Ordering::SeqCst)
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.terminate.load(Ordering::Acquire)
    }
}

impl Executor for ThreadPoolExecutor {
    fn submit(&self, task: Task) -> Result<(), Error> {
        let mut tasks = self.shared.tasks.lock().unwrap();
        if self.shared.terminate.load(Ordering::Acquire) {
            log::warn!("rejecting task submitted after thread pool shutdown");
            return Err(Error::ExecutorShutdown);
        }
        tasks.push_back(task);
        drop(tasks);
        self.shared.available.notify_one();
        Ok(())
    }
}

impl Default for ThreadPoolExecutor {
    fn default() -> Self {
        Self::with_default_threads()
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.wait_and_stop();
    }
}

impl Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("num_threads", &self.num_threads)
            .field("in_flight", &self.in_flight())
            .field("is_shutdown", &self.is_shutdown())
            .finish()
    }
}

fn default_num_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_THREADS)
}

/// Configures and spawns a [`ThreadPoolExecutor`].
pub struct ThreadPoolBuilder {
    num_threads: Option<usize>,
    thread_name: Box<dyn Fn(usize) -> String>,
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name: Box::new(|i| format!("worker-{i}")),
        }
    }
}

impl Debug for ThreadPoolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolBuilder")
            .field("num_threads", &self.num_threads)
            .finish_non_exhaustive()
    }
}

impl ThreadPoolBuilder {
    /// Sets the number of workers. Defaults to the available parallelism.
    pub fn num_threads(self, num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            ..self
        }
    }

    /// Sets how worker `i` is named. An empty name leaves the thread unnamed.
    pub fn thread_name<F>(self, thread_name: F) -> Self
    where
        F: Fn(usize) -> String + 'static,
    {
        Self {
            thread_name: Box::new(thread_name),
            ..self
        }
    }

    /// Spawns the workers.
    ///
    /// Fails with [`Error::ZeroThreads`] for an empty pool, or
    /// [`Error::Spawn`] if the OS refuses a thread; workers spawned before
    /// the failure are stopped and joined.
    pub fn build(self) -> Result<ThreadPoolExecutor, Error> {
        let num_threads = self.num_threads.unwrap_or_else(default_num_threads);
        if num_threads == 0 {
            return Err(Error::ZeroThreads);
        }

        let pool = ThreadPoolExecutor {
            shared: Arc::new(Shared {
                tasks: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
                terminate: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                panicked: AtomicUsize::new(0),
                lifecycle: Mutex::new(Lifecycle::default()),
                exited: Condvar::new(),
            }),
            workers: Mutex::new(Vec::with_capacity(num_threads)),
            num_threads,
        };
        for i in 0..num_threads {
            let name = (self.thread_name)(i);
            let mut builder = thread::Builder::new();
            if !name.is_empty() {
                builder = builder.name(name.clone());
            }
            let shared = pool.shared.clone();
            pool.shared.lifecycle.lock().unwrap().live += 1;
            match builder.spawn(move || shared.run(name)) {
                Ok(handle) => pool.workers.lock().unwrap().push(handle),
                Err(err) => {
                    pool.shared.lifecycle.lock().unwrap().live -= 1;
                    return Err(err.into());
                }
            }
        }
        log::debug!("thread pool started with {num_threads} workers");
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::ThreadPoolExecutor;
    use crate::{Error, Executor};
    use std::{
        panic,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            mpsc::channel,
            Arc, Barrier,
        },
        thread,
        time::Duration,
    };

    #[test]
    fn test_new_thread_pool() {
        let pool = ThreadPoolExecutor::new(2);
        assert_eq!(pool.num_threads(), 2);
        assert!(!pool.is_shutdown());
        drop(pool);
    }

    #[test]
    #[should_panic]
    fn test_new_thread_pool_zero_threads() {
        ThreadPoolExecutor::new(0);
    }

    #[test]
    fn test_builder_zero_threads() {
        let result = ThreadPoolExecutor::builder().num_threads(0).build();
        assert!(matches!(result, Err(Error::ZeroThreads)));
    }

    #[test]
    fn test_with_default_threads() {
        let pool = ThreadPoolExecutor::with_default_threads();
        assert!(pool.num_threads() >= 1);
    }

    #[test]
    fn test_wait_and_stop_drains_queue() {
        let pool = ThreadPoolExecutor::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.execute(move || {
                thread::sleep(Duration::from_millis(5));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.wait_and_stop();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(pool.queued(), 0);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_single_worker_runs_in_fifo_order() {
        let pool = ThreadPoolExecutor::new(1);
        let (tx, rx) = channel();
        for i in 0..20 {
            let tx = tx.clone();
            pool.execute(move || tx.send(i).unwrap()).unwrap();
        }
        pool.wait_and_stop();
        drop(tx);
        assert_eq!(rx.iter().collect::<Vec<_>>(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_submit_after_stop_is_rejected() {
        let pool = ThreadPoolExecutor::new(2);
        pool.wait_and_stop();
        assert!(pool.is_shutdown());

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_task = ran.clone();
        let result = pool.submit(Box::new(move || {
            ran_task.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(matches!(result, Err(Error::ExecutorShutdown)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wait_and_stop_twice() {
        let pool = ThreadPoolExecutor::new(2);
        pool.wait_and_stop();
        pool.wait_and_stop();
    }

    #[test]
    fn test_tasks_run_on_named_workers() {
        let pool = ThreadPoolExecutor::builder()
            .num_threads(2)
            .thread_name(|i| format!("pool-{i}"))
            .build()
            .unwrap();
        let caller = thread::current().id();
        let (tx, rx) = channel();
        pool.execute(move || {
            let current = thread::current();
            tx.send((current.id(), current.name().map(String::from)))
                .unwrap();
        })
        .unwrap();

        let (id, name) = rx.recv().unwrap();
        assert_ne!(id, caller);
        let name = name.unwrap();
        assert!(name == "pool-0" || name == "pool-1", "unexpected name {name}");
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let pool = ThreadPoolExecutor::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        pool.execute(|| panic::resume_unwind(Box::new("task panic")))
            .unwrap();
        let counter_task = counter.clone();
        pool.execute(move || {
            counter_task.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.wait_and_stop();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.panicked_tasks(), 1);
    }

    #[test]
    fn test_in_flight_counts_running_tasks() {
        let pool = ThreadPoolExecutor::new(2);
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel::<()>();
        pool.execute(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
        .unwrap();

        started_rx.recv().unwrap();
        assert_eq!(pool.in_flight(), 1);
        release_tx.send(()).unwrap();
        pool.wait_and_stop();
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_drop_last_handle_inside_task() {
        let pool = Arc::new(ThreadPoolExecutor::new(2));
        let (tx, rx) = channel();
        let pool_task = pool.clone();
        let (ready_tx, ready_rx) = channel::<()>();
        pool.execute(move || {
            ready_rx.recv().unwrap();
            drop(pool_task);
            tx.send(()).unwrap();
        })
        .unwrap();
        drop(pool);
        ready_tx.send(()).unwrap();
        rx.recv_timeout(Duration::from_secs(5))
            .expect("dropping the pool from its own task must not deadlock");
    }

    #[test]
    fn test_concurrent_wait_and_stop_both_wait_for_drain() {
        let pool = Arc::new(ThreadPoolExecutor::new(1));
        let finished = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = channel();
        {
            let finished = finished.clone();
            pool.execute(move || {
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(200));
                finished.store(true, Ordering::SeqCst);
            })
            .unwrap();
        }
        started_rx.recv().unwrap();

        let stoppers: Vec<_> = (0..2)
            .map(|_| {
                let pool = pool.clone();
                let finished = finished.clone();
                thread::spawn(move || {
                    pool.wait_and_stop();
                    finished.load(Ordering::SeqCst)
                })
            })
            .collect();
        for stopper in stoppers {
            assert!(stopper.join().expect("The stopper thread has panicked"));
        }
    }

    #[test]
    fn test_wait_and_stop_after_stop_from_task_waits_for_that_task() {
        let pool = Arc::new(ThreadPoolExecutor::new(2));
        let finished = Arc::new(AtomicBool::new(false));
        let (stopped_tx, stopped_rx) = channel();
        {
            let pool_task = pool.clone();
            let finished = finished.clone();
            pool.execute(move || {
                pool_task.wait_and_stop();
                stopped_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(200));
                finished.store(true, Ordering::SeqCst);
            })
            .unwrap();
        }
        stopped_rx.recv().unwrap();
        pool.wait_and_stop();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_workers_stopping_pool_together() {
        let pool = Arc::new(ThreadPoolExecutor::new(2));
        let barrier = Arc::new(Barrier::new(2));
        let (tx, rx) = channel();
        for _ in 0..2 {
            let pool_task = pool.clone();
            let barrier = barrier.clone();
            let tx = tx.clone();
            pool.execute(move || {
                barrier.wait();
                pool_task.wait_and_stop();
                tx.send(()).unwrap();
            })
            .unwrap();
        }
        for _ in 0..2 {
            rx.recv_timeout(Duration::from_secs(5))
                .expect("workers stopping the pool together must not deadlock");
        }
        pool.wait_and_stop();
    }

    #[test]
    fn test_builder_debug() {
        let builder = ThreadPoolExecutor::builder().num_threads(3);
        assert!(format!("{builder:?}").contains("num_threads: Some(3)"));
    }
}
