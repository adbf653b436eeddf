#![warn(missing_debug_implementations, rust_2018_idioms)]

//! A fixed-capacity async circular buffer with built-in backpressure.
//!
//! [`AsyncCircularBuffer`] is a bounded FIFO shared by any number of
//! producers and consumers. `enqueue` suspends while the buffer is full and
//! `dequeue` suspends while it is empty; neither ties up a worker thread
//! while waiting. Blocking variants are provided for plain threads.
//!
//! Internally the ring is guarded by two gates: an exclusion gate that lets
//! one operation at a time inspect the ring, and a hand-off gate on which
//! operations that cannot proceed are parked. A completing operation passes
//! ownership straight to a parked one, so a released waiter always finds the
//! slot or item it was waiting for.
//!
//! ```
//! use gated_ring::AsyncCircularBuffer;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let buffer = AsyncCircularBuffer::new(2).unwrap();
//! buffer.enqueue("a").await.unwrap();
//! buffer.enqueue("b").await.unwrap();
//! assert!(buffer.is_full());
//! assert_eq!(buffer.dequeue().await.unwrap(), "a");
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod telemetry;

// Internal utilities - not part of public API but exposed for crate use
mod coord;
mod internal;

pub use buffer::AsyncCircularBuffer;
pub use config::{BufferBuilder, BufferConfig};
pub use error::{BuildError, DequeueError, EnqueueError};

// Helper function to check if a type is Send + Sync.
#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}

#[allow(dead_code)]
fn buffer_is_send_sync() {
  assert_send_sync::<AsyncCircularBuffer<String>>();
}
