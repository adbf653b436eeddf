// src/error.rs

use core::fmt;

use thiserror::Error;

/// Errors that can occur when building a buffer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
  /// The buffer was configured with a capacity of zero. A circular buffer
  /// needs at least one slot.
  #[error("buffer capacity must be greater than zero")]
  ZeroCapacity,
}

/// Error returned by `enqueue` operations when the item could not be stored.
///
/// The item being enqueued is handed back to the caller.
#[derive(Error, PartialEq, Eq, Clone)]
pub enum EnqueueError<T> {
  /// The buffer was disposed before or while the operation was waiting.
  #[error("buffer disposed")]
  Disposed(T),
}

impl<T> EnqueueError<T> {
  /// Consumes the error, returning the inner value.
  #[inline]
  pub fn into_inner(self) -> T {
    match self {
      EnqueueError::Disposed(v) => v,
    }
  }
}

impl<T> fmt::Debug for EnqueueError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EnqueueError::Disposed(_) => write!(f, "EnqueueError::Disposed(..)"),
    }
  }
}

/// Error returned by `dequeue` operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DequeueError {
  /// The buffer was disposed before or while the operation was waiting.
  #[error("buffer disposed")]
  Disposed,
}

/// Internal marker returned by gate operations once the gate has been disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Disposed;

impl From<Disposed> for DequeueError {
  fn from(_: Disposed) -> Self {
    DequeueError::Disposed
  }
}
