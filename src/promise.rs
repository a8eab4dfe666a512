use crate::future::Future;
use crate::shared_state::SharedState;
use crate::Error;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Creates a connected [`Promise`] and [`Future`] pair.
///
/// The returned promise has already handed out its future, so a later
/// [`Promise::get_future`] fails with [`Error::FutureAlreadyRetrieved`].
///
/// # Examples
///
/// ```
/// use std::thread;
/// use tiny_future::promise;
///
/// let (promise, mut future) = promise::<String>();
/// let task1 = thread::spawn(move || promise.set_value("Hi".into()));
/// task1.join().expect("The task1 thread has panicked.");
///
/// future.then_value(|value| assert_eq!(value, "Hi"));
/// future.get().unwrap();
/// ```
pub fn promise<T>() -> (Promise<T>, Future<T>) {
    let state = SharedState::create();
    (
        Promise {
            state: state.clone(),
            retrieved: true,
        },
        Future::new(state),
    )
}

/// The producer half: supplies the value once.
///
/// A promise hands out a single [`Future`] and is consumed by
/// [`set_value`](Promise::set_value), so neither a second consumer nor a
/// second value can ever be attached.
pub struct Promise<T> {
    state: Arc<SharedState<T>>,
    retrieved: bool,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self {
            state: SharedState::create(),
            retrieved: false,
        }
    }

    /// Hands out the future sharing this promise's state.
    ///
    /// Only the first call succeeds; later calls return
    /// [`Error::FutureAlreadyRetrieved`].
    ///
    /// # Examples
    ///
    /// ```
    /// use tiny_future::{Error, Promise};
    ///
    /// let mut promise = Promise::<u32>::new();
    /// let _future = promise.get_future().unwrap();
    /// assert!(matches!(promise.get_future(), Err(Error::FutureAlreadyRetrieved)));
    /// ```
    pub fn get_future(&mut self) -> Result<Future<T>, Error> {
        if self.retrieved {
            return Err(Error::FutureAlreadyRetrieved);
        }
        self.retrieved = true;
        Ok(Future::new(self.state.clone()))
    }

    /// Stores the value, consuming the promise.
    ///
    /// Nothing runs yet: the callback is dispatched when the consumer calls
    /// [`Future::get`].
    pub fn set_value(self, value: T) {
        self.state.set_value(value);
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("retrieved", &self.retrieved)
            .finish()
    }
}
