//! The raw slot array behind the buffer.
//!
//! `SlotStore` performs index arithmetic and raw reads/writes and nothing
//! else. It has no synchronization of its own: every mutating method is
//! `unsafe` and requires the caller to hold the buffer's ownership baton.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct SlotStore<T> {
  slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
  head: UnsafeCell<usize>, // Next write index
  tail: UnsafeCell<usize>, // Next read index
  // Written only by the baton holder; published atomically so that
  // `len()` can be sampled from anywhere as an advisory snapshot.
  count: AtomicUsize,
}

impl<T> fmt::Debug for SlotStore<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SlotStore")
      .field("capacity", &self.capacity())
      .field("count", &self.len())
      .finish_non_exhaustive()
  }
}

impl<T> SlotStore<T> {
  pub(crate) fn new(capacity: usize) -> Self {
    assert!(capacity > 0, "SlotStore capacity must be greater than 0");
    let mut slots = Vec::with_capacity(capacity);
    for _ in 0..capacity {
      slots.push(UnsafeCell::new(MaybeUninit::uninit()));
    }
    Self {
      slots: slots.into_boxed_slice(),
      head: UnsafeCell::new(0),
      tail: UnsafeCell::new(0),
      count: AtomicUsize::new(0),
    }
  }

  #[inline]
  pub(crate) fn capacity(&self) -> usize {
    self.slots.len()
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.count.load(Ordering::Acquire)
  }

  #[inline]
  pub(crate) fn is_full(&self) -> bool {
    self.len() == self.capacity()
  }

  #[inline]
  pub(crate) fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Moves `cursor` one slot forward, wrapping at capacity, and returns the
  /// index it pointed at before the move.
  #[inline]
  fn advance(&self, cursor: &mut usize) -> usize {
    let current = *cursor;
    *cursor = (current + 1) % self.slots.len();
    current
  }

  /// Stores `value` at `head` and advances it.
  ///
  /// # Safety
  /// The caller must hold exclusive ownership of the store and the store
  /// must not be full.
  pub(crate) unsafe fn write(&self, value: T) {
    debug_assert!(!self.is_full(), "write into a full SlotStore");
    let index = self.advance(&mut *self.head.get());
    (*self.slots[index].get()).write(value);
    self.count.fetch_add(1, Ordering::Release);
  }

  /// Takes the value at `tail` and advances it.
  ///
  /// # Safety
  /// The caller must hold exclusive ownership of the store and the store
  /// must not be empty.
  pub(crate) unsafe fn read(&self) -> T {
    debug_assert!(!self.is_empty(), "read from an empty SlotStore");
    let index = self.advance(&mut *self.tail.get());
    let value = (*self.slots[index].get()).assume_init_read();
    self.count.fetch_sub(1, Ordering::Release);
    value
  }
}

impl<T> Drop for SlotStore<T> {
  fn drop(&mut self) {
    let capacity = self.slots.len();
    let tail = *self.tail.get_mut();
    let count = *self.count.get_mut();
    for offset in 0..count {
      let index = (tail + offset) % capacity;
      unsafe { self.slots[index].get_mut().assume_init_drop() };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn write_read_wraps_around() {
    let store = SlotStore::new(3);
    unsafe {
      for round in 0..4 {
        store.write(round * 10);
        store.write(round * 10 + 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.read(), round * 10);
        assert_eq!(store.read(), round * 10 + 1);
        assert!(store.is_empty());
      }
    }
  }

  #[test]
  fn full_and_empty_track_count() {
    let store = SlotStore::new(2);
    assert!(store.is_empty());
    assert!(!store.is_full());
    unsafe {
      store.write('a');
      store.write('b');
    }
    assert!(store.is_full());
    assert_eq!(unsafe { store.read() }, 'a');
    assert!(!store.is_full());
    assert!(!store.is_empty());
  }

  #[test]
  fn drop_releases_unread_items_once() {
    let marker = Arc::new(());
    {
      let store = SlotStore::new(4);
      unsafe {
        for _ in 0..4 {
          store.write(marker.clone());
        }
        // Move tail so the remaining items straddle the wrap point.
        drop(store.read());
        drop(store.read());
        store.write(marker.clone());
      }
      assert_eq!(Arc::strong_count(&marker), 4);
    }
    assert_eq!(Arc::strong_count(&marker), 1);
  }

  #[test]
  #[should_panic(expected = "capacity must be greater than 0")]
  fn zero_capacity_panics() {
    let _ = SlotStore::<u8>::new(0);
  }
}
