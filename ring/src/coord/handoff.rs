//! The hand-off gate: parks operations whose precondition is false and later
//! passes ownership straight to one of them.

use std::fmt;

use super::gate::{Gate, GateWait};
use crate::error::Disposed;

/// A closed [`Gate`] plus the count of operations parked on it.
///
/// The gate is never opened. A parked operation only continues when a
/// completing operation calls [`hand_off`](Self::hand_off), which transfers
/// ownership of the buffer to it directly. The waiter count is the length
/// of the gate's queue, so the `waiter_count > 0` check, the decrement and
/// the signal in `hand_off` happen under one lock and cannot race with a
/// waiter withdrawing itself.
pub(crate) struct HandoffGate {
  gate: Gate,
}

impl fmt::Debug for HandoffGate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HandoffGate")
      .field("waiter_count", &self.waiter_count())
      .field("disposed", &self.gate.is_disposed())
      .finish()
  }
}

impl HandoffGate {
  pub(crate) fn new() -> Self {
    Self {
      gate: Gate::new(false),
    }
  }

  /// Registers the caller as a waiter (`waiter_count += 1`). The caller must
  /// still hold ownership when registering.
  pub(crate) fn register(&self) -> Result<GateWait<'_>, Disposed> {
    self.gate.park()
  }

  /// If anyone is waiting, wakes the oldest waiter (`waiter_count -= 1`) and
  /// returns `true`. Ownership has then moved to that waiter.
  pub(crate) fn hand_off(&self) -> bool {
    self.gate.signal_parked()
  }

  #[inline]
  pub(crate) fn waiter_count(&self) -> usize {
    self.gate.parked()
  }

  pub(crate) fn dispose(&self) -> bool {
    self.gate.dispose()
  }
}
