//! Fixed-capacity circular storage.
//!
//! [`RingBuffer`] holds at most `capacity` elements and never reallocates.
//! Values are moved in at the tail and moved out at the head, so the buffer
//! behaves as a FIFO queue. It does no locking of its own; see
//! [`BlockingQueue`](crate::BlockingQueue) for the thread-safe wrapper.

use crate::Error;
use std::fmt::{self, Debug};

/// A bounded FIFO buffer backed by a fixed slice of slots.
///
/// # Examples
///
/// ```
/// use tiny_future::RingBuffer;
///
/// let mut buffer = RingBuffer::new(2).unwrap();
/// assert!(buffer.try_push("a").is_ok());
/// assert!(buffer.try_push("b").is_ok());
/// assert_eq!(buffer.try_push("c"), Err("c"));
///
/// assert_eq!(buffer.try_pop(), Some("a"));
/// assert_eq!(buffer.try_pop(), Some("b"));
/// assert_eq!(buffer.try_pop(), None);
/// ```
pub struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer able to hold `capacity` elements.
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        let slots = (0..capacity).map(|_| None).collect();
        Ok(Self {
            slots,
            head: 0,
            tail: 0,
            len: 0,
        })
    }

    /// Moves `value` in at the tail.
    ///
    /// When the buffer is full nothing is stored and `value` is handed back
    /// in the `Err`.
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        self.slots[self.tail] = Some(value);
        self.tail = self.advance(self.tail);
        self.len += 1;
        Ok(())
    }

    /// Moves the oldest element out, or returns `None` when empty.
    pub fn try_pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = self.advance(self.head);
        self.len -= 1;
        value
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn advance(&self, pos: usize) -> usize {
        (pos + 1) % self.capacity()
    }
}

impl<T> Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
