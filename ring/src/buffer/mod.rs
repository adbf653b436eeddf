//! The public buffer handle.

mod controller;

use std::fmt;

use tracing::debug;

use crate::config::{BufferBuilder, BufferConfig};
use crate::error::{BuildError, DequeueError, EnqueueError};
use controller::{Op, Shared};

/// A fixed-capacity FIFO buffer with suspension-based enqueue and dequeue.
///
/// `enqueue` waits while the buffer is full and `dequeue` waits while it is
/// empty. Waiting never blocks a worker thread in the async API; the
/// `*_blocking` variants park the calling OS thread instead, and both kinds
/// of callers can share one buffer. Any number of producers and consumers
/// may use the buffer concurrently (wrap it in an `Arc` to share it).
///
/// Waiters are released in the order they started waiting, and an operation
/// released because the buffer changed state is guaranteed to find the
/// slot or item it was waiting for.
///
/// `len`, `is_empty` and `is_full` are advisory snapshots: another
/// operation may change the buffer before the caller acts on them.
pub struct AsyncCircularBuffer<T> {
  shared: Shared<T>,
}

impl<T> fmt::Debug for AsyncCircularBuffer<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncCircularBuffer")
      .field("name", &self.shared.name())
      .field("capacity", &self.capacity())
      .field("len", &self.len())
      .field("waiting", &self.waiting())
      .field("disposed", &self.is_disposed())
      .finish()
  }
}

impl<T> AsyncCircularBuffer<T> {
  /// Creates a buffer with `capacity` slots.
  ///
  /// Returns [`BuildError::ZeroCapacity`] if `capacity` is zero.
  pub fn new(capacity: usize) -> Result<Self, BuildError> {
    BufferBuilder::new().capacity(capacity).build()
  }

  /// Returns a builder for configuring a buffer.
  pub fn builder() -> BufferBuilder<T> {
    BufferBuilder::new()
  }

  /// Creates a buffer from a [`BufferConfig`].
  pub fn from_config(config: BufferConfig) -> Result<Self, BuildError> {
    BufferBuilder::from(config).build()
  }

  pub(crate) fn from_validated(config: BufferConfig) -> Self {
    let shared = Shared::new(config.capacity, config.name);
    debug!(buffer = shared.label(), capacity = config.capacity, "buffer created");
    Self { shared }
  }

  /// Stores `item` at the back of the buffer, waiting while the buffer is
  /// full.
  ///
  /// Fails only if the buffer is disposed before the item is stored, in
  /// which case the item is returned inside the error.
  pub async fn enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
    match self.shared.acquire_for(Op::Enqueue).await {
      Ok(mut baton) => {
        baton.write(item);
        Ok(())
      }
      Err(_) => Err(EnqueueError::Disposed(item)),
    }
  }

  /// Removes and returns the oldest item, waiting while the buffer is empty.
  pub async fn dequeue(&self) -> Result<T, DequeueError> {
    let mut baton = self.shared.acquire_for(Op::Dequeue).await?;
    Ok(baton.read())
  }

  /// Blocking version of [`enqueue`](Self::enqueue). Parks the current
  /// thread while the buffer is full.
  pub fn enqueue_blocking(&self, item: T) -> Result<(), EnqueueError<T>> {
    match self.shared.acquire_for_blocking(Op::Enqueue) {
      Ok(mut baton) => {
        baton.write(item);
        Ok(())
      }
      Err(_) => Err(EnqueueError::Disposed(item)),
    }
  }

  /// Blocking version of [`dequeue`](Self::dequeue). Parks the current
  /// thread while the buffer is empty.
  pub fn dequeue_blocking(&self) -> Result<T, DequeueError> {
    let mut baton = self.shared.acquire_for_blocking(Op::Dequeue)?;
    Ok(baton.read())
  }

  /// The fixed number of slots.
  #[doc(alias = "size")]
  #[inline]
  pub fn capacity(&self) -> usize {
    self.shared.store().capacity()
  }

  /// Number of items currently stored. Advisory under concurrency.
  #[doc(alias = "count")]
  #[inline]
  pub fn len(&self) -> usize {
    self.shared.store().len()
  }

  /// Returns `true` if no items are stored. Advisory under concurrency.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Returns `true` if every slot is occupied. Advisory under concurrency.
  #[inline]
  pub fn is_full(&self) -> bool {
    self.len() == self.capacity()
  }

  /// Number of operations currently waiting for the buffer to become
  /// non-full or non-empty. Advisory under concurrency.
  pub fn waiting(&self) -> usize {
    self.shared.waiter_count()
  }

  /// The label given at construction, if any.
  pub fn name(&self) -> Option<&str> {
    self.shared.name()
  }

  /// Releases the buffer's signalling resources.
  ///
  /// Idempotent. After disposal every new operation fails immediately and
  /// every waiting operation is woken with an error (enqueues get their
  /// item back). An operation that already owns the buffer completes its
  /// single read or write. Items still stored are dropped with the buffer.
  ///
  /// Called automatically when the buffer is dropped.
  pub fn dispose(&self) {
    if self.shared.dispose() {
      debug!(
        buffer = self.shared.label(),
        remaining = self.len(),
        "buffer disposed"
      );
    }
  }

  /// Returns `true` once [`dispose`](Self::dispose) has been called.
  pub fn is_disposed(&self) -> bool {
    self.shared.is_disposed()
  }
}

impl<T> Drop for AsyncCircularBuffer<T> {
  fn drop(&mut self) {
    self.dispose();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::time::timeout;

  #[test]
  fn zero_capacity_is_rejected() {
    assert_eq!(
      AsyncCircularBuffer::<u8>::new(0).unwrap_err(),
      BuildError::ZeroCapacity
    );
  }

  #[tokio::test]
  async fn counts_follow_operations() {
    let buffer = AsyncCircularBuffer::new(5).unwrap();
    assert_eq!(buffer.len(), 0);

    for i in 1..=5 {
      buffer.enqueue(i).await.unwrap();
      assert_eq!(buffer.len(), i);
    }
    for i in 1..=5 {
      assert_eq!(buffer.dequeue().await.unwrap(), i);
      assert_eq!(buffer.len(), 5 - i);
    }
  }

  #[tokio::test]
  async fn dispose_rejects_new_operations() {
    let buffer = AsyncCircularBuffer::new(2).unwrap();
    buffer.enqueue("kept").await.unwrap();
    buffer.dispose();
    buffer.dispose();
    assert!(buffer.is_disposed());

    match buffer.enqueue("late").await {
      Err(EnqueueError::Disposed(item)) => assert_eq!(item, "late"),
      other => panic!("expected EnqueueError::Disposed, got {:?}", other),
    }
    assert_eq!(buffer.dequeue().await, Err(DequeueError::Disposed));
    assert_eq!(buffer.len(), 1);
  }

  #[tokio::test]
  async fn dispose_wakes_parked_dequeue() {
    let buffer = Arc::new(AsyncCircularBuffer::<u8>::new(1).unwrap());

    let buffer_for_task = buffer.clone();
    let task = tokio::spawn(async move { buffer_for_task.dequeue().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(buffer.waiting(), 1);

    buffer.dispose();
    let outcome = timeout(Duration::from_millis(500), task)
      .await
      .expect("parked dequeue was not woken by dispose")
      .unwrap();
    assert_eq!(outcome, Err(DequeueError::Disposed));
  }

  #[test]
  fn debug_output_shows_state() {
    let buffer = AsyncCircularBuffer::<u8>::builder().capacity(4).name("dbg").build().unwrap();
    let rendered = format!("{:?}", buffer);
    assert!(rendered.contains("\"dbg\""));
    assert!(rendered.contains("capacity: 4"));
  }
}
