use crate::executor::Executor;
use crate::Error;
use std::sync::{Arc, Mutex};

/// The continuation registered by [`Future::then_value`](crate::Future::then_value).
pub(crate) type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// The rendezvous cell between one [`Promise`](crate::Promise) and its
/// [`Future`](crate::Future).
///
/// Every slot sits behind one mutex, so the producer and the consumer may
/// live on different threads. Only reachable through [`SharedState::create`].
pub(crate) struct SharedState<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    value: Option<T>,
    has_value: bool,
    callback: Option<Callback<T>>,
    executor: Option<Arc<dyn Executor>>,
}

impl<T> SharedState<T> {
    pub(crate) fn create() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                value: None,
                has_value: false,
                callback: None,
                executor: None,
            }),
        })
    }

    pub(crate) fn set_value(&self, value: T) {
        let mut inner = self.inner.lock().unwrap();
        inner.value = Some(value);
        inner.has_value = true;
    }

    /// Last write wins.
    pub(crate) fn set_callback(&self, callback: Callback<T>) {
        self.inner.lock().unwrap().callback = Some(callback);
    }

    /// `None` runs the callback inline. Last write wins.
    pub(crate) fn set_executor(&self, executor: Option<Arc<dyn Executor>>) {
        self.inner.lock().unwrap().executor = executor;
    }

    pub(crate) fn has_value(&self) -> bool {
        self.inner.lock().unwrap().has_value
    }
}

impl<T: Send + 'static> SharedState<T> {
    /// Hands the value to the callback, on the bound executor if there is
    /// one, otherwise on the calling thread.
    ///
    /// Value, callback and executor are all taken out of the cell before
    /// dispatch, so the callback runs without the lock held and the cell no
    /// longer keeps the executor alive.
    ///
    /// # Panics
    ///
    /// Panics if no value has been set, or if it was already dispatched.
    pub(crate) fn call(&self) -> Result<(), Error> {
        let (value, callback, executor) = {
            let mut inner = self.inner.lock().unwrap();
            assert!(
                inner.has_value,
                "Future::get() called before the promise supplied a value"
            );
            let value = inner
                .value
                .take()
                .unwrap_or_else(|| panic!("SharedState::call() on an already dispatched value"));
            (value, inner.callback.take(), inner.executor.take())
        };

        let Some(callback) = callback else {
            log::debug!("future consumed without a callback, dropping its value");
            return Ok(());
        };
        match executor {
            Some(executor) => {
                log::trace!("dispatching continuation to executor");
                executor.submit(Box::new(move || callback(value)))
            }
            None => {
                log::trace!("running continuation inline");
                callback(value);
                Ok(())
            }
        }
    }
}
