//! Construction-time configuration for [`AsyncCircularBuffer`].

use std::marker::PhantomData;

use crate::buffer::AsyncCircularBuffer;
use crate::error::BuildError;

/// Plain configuration values for a buffer.
///
/// With the `serde` feature enabled this can be deserialized from any
/// serde format and turned into a builder with `BufferBuilder::from`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct BufferConfig {
  /// Number of slots. Must be greater than zero.
  pub capacity: usize,
  /// Optional label attached to log events emitted by the buffer.
  pub name: Option<String>,
}

/// A builder for creating an [`AsyncCircularBuffer`].
///
/// ```
/// use gated_ring::BufferBuilder;
///
/// let buffer = BufferBuilder::<u32>::new()
///   .capacity(16)
///   .name("ingest")
///   .build()
///   .unwrap();
/// assert_eq!(buffer.capacity(), 16);
/// assert_eq!(buffer.name(), Some("ingest"));
/// ```
#[derive(Debug)]
pub struct BufferBuilder<T> {
  config: BufferConfig,
  _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for BufferBuilder<T> {
  fn default() -> Self {
    Self {
      config: BufferConfig::default(),
      _phantom: PhantomData,
    }
  }
}

impl<T> BufferBuilder<T> {
  /// Creates a new builder. The capacity must be set before `build`.
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the fixed number of slots.
  pub fn capacity(mut self, capacity: usize) -> Self {
    self.config.capacity = capacity;
    self
  }

  /// Sets a label used to identify the buffer in log events.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.config.name = Some(name.into());
    self
  }

  /// Returns the configuration accumulated so far.
  pub fn config(&self) -> &BufferConfig {
    &self.config
  }

  /// Validates the configuration and creates the buffer.
  pub fn build(self) -> Result<AsyncCircularBuffer<T>, BuildError> {
    if self.config.capacity == 0 {
      return Err(BuildError::ZeroCapacity);
    }
    Ok(AsyncCircularBuffer::from_validated(self.config))
  }
}

impl<T> From<BufferConfig> for BufferBuilder<T> {
  fn from(config: BufferConfig) -> Self {
    Self {
      config,
      _phantom: PhantomData,
    }
  }
}
