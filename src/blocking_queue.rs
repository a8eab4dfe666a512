//! A bounded queue that can be shared between threads.
//!
//! [`BlockingQueue`] wraps a [`RingBuffer`] in a mutex and pairs it with two
//! condition variables: pushers wait on `not_full`, poppers wait on
//! `not_empty`. Every operation goes through the one lock.

use crate::ring_buffer::RingBuffer;
use crate::Error;
use std::fmt::{self, Debug};
use std::sync::{Condvar, Mutex};

/// A fixed-capacity FIFO queue with blocking and non-blocking push/pop.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use tiny_future::BlockingQueue;
///
/// let queue = Arc::new(BlockingQueue::new(1).unwrap());
/// let producer = {
///     let queue = queue.clone();
///     thread::spawn(move || {
///         for i in 0..4 {
///             queue.wait_and_push(i);
///         }
///     })
/// };
/// let received: Vec<_> = (0..4).map(|_| queue.wait_and_pop()).collect();
/// producer.join().expect("The producer thread has panicked");
/// assert_eq!(received, vec![0, 1, 2, 3]);
/// ```
pub struct BlockingQueue<T> {
    buffer: Mutex<RingBuffer<T>>,
    capacity: usize,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> BlockingQueue<T> {
    /// Creates an empty queue holding at most `capacity` elements.
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        Ok(Self {
            buffer: Mutex::new(RingBuffer::new(capacity)?),
            capacity,
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        })
    }

    /// Pushes without blocking. A full queue hands `value` back in the `Err`.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.try_push(value)?;
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until there is room, then pushes `value` and wakes one popper.
    pub fn wait_and_push(&self, value: T) {
        let buffer = self.buffer.lock().unwrap();
        let mut buffer = self
            .not_full
            .wait_while(buffer, |buffer| buffer.is_full())
            .unwrap();
        if buffer.try_push(value).is_err() {
            unreachable!("buffer has room after waiting on not_full");
        }
        self.not_empty.notify_one();
    }

    /// Pops without blocking, returning `None` when the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        let mut buffer = self.buffer.lock().unwrap();
        let value = buffer.try_pop()?;
        self.not_full.notify_one();
        Some(value)
    }

    /// Blocks until an element is available, pops it and wakes one pusher.
    pub fn wait_and_pop(&self) -> T {
        let buffer = self.buffer.lock().unwrap();
        let mut buffer = self
            .not_empty
            .wait_while(buffer, |buffer| buffer.is_empty())
            .unwrap();
        match buffer.try_pop() {
            Some(value) => {
                self.not_full.notify_one();
                value
            }
            None => unreachable!("buffer has an element after waiting on not_empty"),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.buffer.lock().unwrap().is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().unwrap().is_empty()
    }
}

impl<T> Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffer = self.buffer.lock().unwrap();
        f.debug_struct("BlockingQueue")
            .field("len", &buffer.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
