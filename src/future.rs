use crate::executor::Executor;
use crate::shared_state::SharedState;
use crate::Error;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// The consumer half: attaches the continuation and triggers it.
///
/// [`via`](Future::via) and [`then_value`](Future::then_value) may be called
/// in either order and any number of times before [`get`](Future::get); each
/// call replaces the previous executor or callback. `get` consumes the future.
pub struct Future<T> {
    state: Arc<SharedState<T>>,
}

impl<T> Future<T> {
    pub(crate) fn new(state: Arc<SharedState<T>>) -> Self {
        Self { state }
    }

    /// Whether the producer has supplied the value yet.
    pub fn is_ready(&self) -> bool {
        self.state.has_value()
    }
}

impl<T: Send + 'static> Future<T> {
    /// Runs the continuation on `executor` instead of on the thread that
    /// calls [`get`](Future::get).
    ///
    /// The future keeps the executor alive until the continuation has been
    /// handed over.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::thread;
    /// use futures::{channel::oneshot, executor::block_on};
    /// use tiny_future::{Promise, ThreadPoolExecutor};
    ///
    /// let pool = Arc::new(ThreadPoolExecutor::new(1));
    /// let mut promise = Promise::<u32>::new();
    /// let mut future = promise.get_future().unwrap();
    /// let (tx, rx) = oneshot::channel();
    ///
    /// future.via(pool.clone());
    /// future.then_value(move |value| tx.send((value, thread::current().id())).unwrap());
    /// promise.set_value(7);
    /// future.get().unwrap();
    ///
    /// let (value, worker) = block_on(rx).unwrap();
    /// assert_eq!(value, 7);
    /// assert_ne!(worker, thread::current().id());
    /// ```
    pub fn via(&mut self, executor: Arc<dyn Executor>) {
        self.state.set_executor(Some(executor));
    }

    /// Registers the callback that receives the value.
    ///
    /// The value is moved into `callback`, never cloned.
    pub fn then_value<F>(&mut self, callback: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.state.set_callback(Box::new(callback));
    }

    /// Consumes the future and dispatches the callback.
    ///
    /// Without a bound executor the callback has finished running by the
    /// time this returns. With one, the callback is queued on it and this
    /// returns the executor's verdict: [`Error::ExecutorShutdown`] if it no
    /// longer accepts work.
    ///
    /// # Panics
    ///
    /// Panics if the promise has not supplied a value yet; the check lives
    /// in the shared state's dispatch.
    pub fn get(self) -> Result<(), Error> {
        self.state.call()
    }
}

impl<T> Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("is_ready", &self.is_ready())
            .finish()
    }
}
