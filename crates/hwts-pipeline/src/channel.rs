//! Bounded single-producer/single-consumer timestamp channel.
//!
//! A fixed-capacity ring buffer shared by exactly one producer (the capture
//! worker) and one consumer (the log worker). It uses:
//!
//! - A power-of-two slot count so wraparound is a bitmask
//! - One reserved slot to tell "full" from "empty" without a counter
//! - Cache-padded cursors to prevent false sharing between the two threads
//!
//! # Threading Model
//!
//! - **Producer**: writes `write_index`, reads `read_index`
//! - **Consumer**: writes `read_index`, reads `write_index`
//!
//! Each cursor has a single writer, so the only synchronization needed is
//! Release on publish and Acquire on observe. The split [`Producer`] /
//! [`Consumer`] handles are not `Clone`, which keeps it to one of each.
//!
//! # Layout
//!
//! ```text
//!            read_index              write_index
//!                 │                       │
//!  ┌────┬────┬────▼────┬────┬────┬────┬───▼┬────┐
//!  │    │    │ r0 │ r1 │ r2 │ r3 │ r4 │    │    │   capacity N, usable N-1
//!  └────┴────┴────┴────┴────┴────┴────┴────┴────┘
//!  empty:  read_index == write_index
//!  full:   (write_index + 1) & (N - 1) == read_index
//! ```

use crossbeam_utils::CachePadded;
use hwts_common::{HwtsError, HwtsResult, DEFAULT_CHANNEL_CAPACITY};
use static_assertions::const_assert;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const_assert!(DEFAULT_CHANNEL_CAPACITY.is_power_of_two());

/// Returned by [`Producer::try_push`] when the channel is at usable
/// capacity. Hands the rejected value back.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Recover the value that could not be pushed.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Full(..)")
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("timestamp channel full")
    }
}

impl<T> std::error::Error for Full<T> {}

struct Shared<T> {
    /// Next slot the producer will fill.
    write_index: CachePadded<AtomicUsize>,
    /// Next slot the consumer will read.
    read_index: CachePadded<AtomicUsize>,
    /// Set once the producer handle is dropped.
    producer_closed: AtomicBool,
    mask: usize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: a slot is written only by the producer while it lies outside
// [read_index, write_index), and read only by the consumer while inside it.
// The cursor handoff (Release store / Acquire load) orders those accesses.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn len(&self) -> usize {
        let write = self.write_index.load(Ordering::Acquire);
        let read = self.read_index.load(Ordering::Acquire);
        write.wrapping_sub(read) & self.mask
    }
}

/// Create a channel with `capacity` slots (usable capacity `capacity - 1`).
///
/// # Errors
///
/// Returns [`HwtsError::InvalidCapacity`] unless `capacity` is a power of
/// two and at least 2.
pub fn channel<T: Copy + Send>(capacity: usize) -> HwtsResult<(Producer<T>, Consumer<T>)> {
    if capacity < 2 || !capacity.is_power_of_two() {
        return Err(HwtsError::InvalidCapacity(capacity));
    }

    let slots = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let shared = Arc::new(Shared {
        write_index: CachePadded::new(AtomicUsize::new(0)),
        read_index: CachePadded::new(AtomicUsize::new(0)),
        producer_closed: AtomicBool::new(false),
        mask: capacity - 1,
        slots,
    });

    Ok((
        Producer {
            shared: Arc::clone(&shared),
        },
        Consumer { shared },
    ))
}

/// Writing half of the channel. Owned by the capture worker.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> Producer<T> {
    /// Enqueue one value without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Full`] carrying `value` if the channel holds
    /// `capacity - 1` values. Channel state is not modified in that case.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), Full<T>> {
        let shared = &*self.shared;
        let write = shared.write_index.load(Ordering::Relaxed);
        let next = (write + 1) & shared.mask;

        if next == shared.read_index.load(Ordering::Acquire) {
            return Err(Full(value));
        }

        // SAFETY: `write` is outside the readable range until the store
        // below publishes it, and this is the only producer.
        unsafe {
            (*shared.slots[write].get()).write(value);
        }

        shared.write_index.store(next, Ordering::Release);
        Ok(())
    }
}

impl<T> Producer<T> {
    /// Total slot count (usable capacity is one less).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Number of values currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Returns true if no values are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.shared.producer_closed.store(true, Ordering::Release);
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// Reading half of the channel. Owned by the log worker.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> Consumer<T> {
    /// Dequeue the oldest value without blocking.
    ///
    /// Returns `None` when the channel is empty; state is not modified.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let read = shared.read_index.load(Ordering::Relaxed);

        if read == shared.write_index.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: `read` is inside the published range, so the producer
        // finished writing it and will not touch it until we advance.
        let value = unsafe { (*shared.slots[read].get()).assume_init_read() };

        shared
            .read_index
            .store((read + 1) & shared.mask, Ordering::Release);
        Some(value)
    }

    /// Pop values until the channel is empty.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.try_pop())
    }
}

impl<T> Consumer<T> {
    /// Total slot count (usable capacity is one less).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Number of values currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Returns true if no values are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once the [`Producer`] has been dropped.
    ///
    /// Every push made before the drop is visible to a subsequent
    /// [`try_pop`](Self::try_pop) once this returns true.
    #[must_use]
    pub fn is_producer_closed(&self) -> bool {
        self.shared.producer_closed.load(Ordering::Acquire)
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("producer_closed", &self.is_producer_closed())
            .finish()
    }
}
