//! The operation protocol shared by enqueue and dequeue.
//!
//! Every operation first enters the exclusion gate. If its precondition
//! holds (not full / not empty) it mutates the store straight away. If not,
//! it registers on the hand-off gate *before* reopening the exclusion gate,
//! then waits until a completing operation hands ownership to it directly.
//!
//! Ownership of the store is represented by a [`Baton`]. Dropping the baton
//! is the finalize step: a baton that came through the exclusion gate
//! passes ownership to the oldest parked waiter if there is one, otherwise
//! (and always for a baton obtained through a hand-off) it reopens the
//! exclusion gate. A woken waiter never re-checks its precondition; the
//! operation that woke it has just produced exactly the slot or item it
//! needs, and nobody else could have observed the store in between.

use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use tracing::trace;

use crate::coord::{Abandoned, Gate, GateWait, HandoffGate};
use crate::error::Disposed;
use crate::internal::SlotStore;
use crate::telemetry;

const LOC_ACQUIRE: &str = "Controller::acquire";
const LOC_FINALIZE: &str = "Controller::finalize";

/// Which side of the buffer an operation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
  Enqueue,
  Dequeue,
}

impl Op {
  /// The precondition check: enqueue waits while full, dequeue while empty.
  #[inline]
  fn is_blocked<T>(self, store: &SlotStore<T>) -> bool {
    match self {
      Op::Enqueue => store.is_full(),
      Op::Dequeue => store.is_empty(),
    }
  }

  fn as_str(self) -> &'static str {
    match self {
      Op::Enqueue => "enqueue",
      Op::Dequeue => "dequeue",
    }
  }
}

pub(crate) struct Shared<T> {
  store: SlotStore<T>,
  exclusion: Gate,
  handoff: HandoffGate,
  name: Option<String>,
}

// The store is only touched by the holder of the baton, and the gates
// guarantee there is at most one.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> fmt::Debug for Shared<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Shared")
      .field("name", &self.name)
      .field("store", &self.store)
      .field("exclusion", &self.exclusion)
      .field("handoff", &self.handoff)
      .finish()
  }
}

impl<T> Shared<T> {
  pub(crate) fn new(capacity: usize, name: Option<String>) -> Self {
    Self {
      store: SlotStore::new(capacity),
      exclusion: Gate::new(true),
      handoff: HandoffGate::new(),
      name,
    }
  }

  #[inline]
  pub(crate) fn store(&self) -> &SlotStore<T> {
    &self.store
  }

  pub(crate) fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  pub(crate) fn label(&self) -> &str {
    self.name.as_deref().unwrap_or("unnamed")
  }

  pub(crate) fn waiter_count(&self) -> usize {
    self.handoff.waiter_count()
  }

  pub(crate) fn is_disposed(&self) -> bool {
    self.exclusion.is_disposed()
  }

  /// Enters the exclusion gate.
  pub(crate) fn acquire(&self) -> Result<Acquire<'_, T>, Disposed> {
    Ok(Acquire {
      shared: self,
      wait: self.exclusion.enter()?,
    })
  }

  /// Acquires ownership and, if `op` cannot proceed, parks until a
  /// completing operation hands ownership over.
  pub(crate) async fn acquire_for(&self, op: Op) -> Result<Baton<'_, T>, Disposed> {
    let baton = self.acquire()?.await?;
    if !op.is_blocked(&self.store) {
      return Ok(baton);
    }
    self.note_parked(op);
    baton.park()?.await
  }

  /// Blocking twin of [`acquire_for`](Self::acquire_for).
  pub(crate) fn acquire_for_blocking(&self, op: Op) -> Result<Baton<'_, T>, Disposed> {
    let baton = self.acquire()?.wait_blocking()?;
    if !op.is_blocked(&self.store) {
      return Ok(baton);
    }
    self.note_parked(op);
    baton.park()?.wait_blocking()
  }

  fn note_parked(&self, op: Op) {
    trace!(
      buffer = self.label(),
      op = op.as_str(),
      waiting = self.handoff.waiter_count(),
      "operation parked"
    );
    telemetry::log_event(LOC_ACQUIRE, "Parked", None);
    telemetry::increment_counter(LOC_ACQUIRE, "parked");
  }

  /// Relinquishes ownership exactly once: hands it to the oldest parked
  /// waiter when allowed and someone is waiting, otherwise reopens the
  /// exclusion gate.
  pub(crate) fn finalize(&self, can_wake_next: bool) {
    if can_wake_next && self.handoff.hand_off() {
      trace!(buffer = self.label(), "ownership handed to parked waiter");
      telemetry::log_event(LOC_FINALIZE, "HandOff", None);
      telemetry::increment_counter(LOC_FINALIZE, "hand_off");
    } else {
      self.exclusion.signal();
      telemetry::increment_counter(LOC_FINALIZE, "release");
    }
  }

  /// Disposes both gates. Returns `false` if this had already happened.
  pub(crate) fn dispose(&self) -> bool {
    let handoff = self.handoff.dispose();
    let exclusion = self.exclusion.dispose();
    handoff || exclusion
  }
}

/// Exclusive right to read and mutate the store. Dropping it finalizes.
#[must_use = "dropping the baton immediately releases ownership of the buffer"]
pub(crate) struct Baton<'a, T> {
  shared: &'a Shared<T>,
  can_wake_next: bool,
}

impl<T> fmt::Debug for Baton<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Baton")
      .field("can_wake_next", &self.can_wake_next)
      .finish_non_exhaustive()
  }
}

impl<'a, T> Baton<'a, T> {
  fn new(shared: &'a Shared<T>, can_wake_next: bool) -> Self {
    Self {
      shared,
      can_wake_next,
    }
  }

  pub(crate) fn write(&mut self, value: T) {
    // SAFETY: holding the baton means no other operation touches the store.
    unsafe { self.shared.store.write(value) }
  }

  pub(crate) fn read(&mut self) -> T {
    // SAFETY: as in `write`.
    unsafe { self.shared.store.read() }
  }

  /// Registers on the hand-off gate, then reopens the exclusion gate so other
  /// operations can make progress while this one waits.
  fn park(self) -> Result<Park<'a, T>, Disposed> {
    let shared = self.shared;
    // On error `self` is dropped here, which finalizes as usual.
    let wait = shared.handoff.register()?;
    mem::forget(self);
    shared.exclusion.signal();
    Ok(Park { shared, wait })
  }
}

impl<T> Drop for Baton<'_, T> {
  fn drop(&mut self) {
    self.shared.finalize(self.can_wake_next);
  }
}

/// Future returned by [`Shared::acquire`].
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub(crate) struct Acquire<'a, T> {
  shared: &'a Shared<T>,
  wait: GateWait<'a>,
}

impl<'a, T> Acquire<'a, T> {
  pub(crate) fn wait_blocking(mut self) -> Result<Baton<'a, T>, Disposed> {
    self.wait.wait_blocking()?;
    Ok(Baton::new(self.shared, true))
  }
}

impl<'a, T> Future for Acquire<'a, T> {
  type Output = Result<Baton<'a, T>, Disposed>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    match Pin::new(&mut this.wait).poll(cx) {
      Poll::Ready(Ok(())) => Poll::Ready(Ok(Baton::new(this.shared, true))),
      Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
      Poll::Pending => Poll::Pending,
    }
  }
}

impl<T> Drop for Acquire<'_, T> {
  fn drop(&mut self) {
    if self.wait.abandon() == Abandoned::Grant {
      // We were let through but never ran; pass the gate on.
      trace!(buffer = self.shared.label(), "relaying abandoned exclusion grant");
      telemetry::increment_counter(LOC_ACQUIRE, "relay");
      self.shared.exclusion.signal();
    }
  }
}

/// Future for an operation parked on the hand-off gate.
#[must_use = "futures do nothing unless you .await or poll them"]
#[derive(Debug)]
pub(crate) struct Park<'a, T> {
  shared: &'a Shared<T>,
  wait: GateWait<'a>,
}

impl<'a, T> Park<'a, T> {
  pub(crate) fn wait_blocking(mut self) -> Result<Baton<'a, T>, Disposed> {
    self.wait.wait_blocking()?;
    Ok(Baton::new(self.shared, false))
  }
}

impl<'a, T> Future for Park<'a, T> {
  type Output = Result<Baton<'a, T>, Disposed>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    match Pin::new(&mut this.wait).poll(cx) {
      Poll::Ready(Ok(())) => Poll::Ready(Ok(Baton::new(this.shared, false))),
      Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
      Poll::Pending => Poll::Pending,
    }
  }
}

impl<T> Drop for Park<'_, T> {
  fn drop(&mut self) {
    if self.wait.abandon() == Abandoned::Grant {
      // The hand-off carried ownership plus one permit (a free slot or an
      // available item). Pass both on as if this operation had gone straight
      // through: to the next parked waiter, or back to the exclusion gate.
      trace!(buffer = self.shared.label(), "relaying abandoned hand-off");
      telemetry::increment_counter(LOC_FINALIZE, "relay");
      self.shared.finalize(true);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures_util::future::poll_immediate;

  #[test]
  fn pass_through_then_release_reopens_exclusion() {
    let shared = Shared::<u32>::new(2, None);
    let mut baton = shared.acquire_for_blocking(Op::Enqueue).unwrap();
    baton.write(1);
    assert!(shared.acquire().unwrap().wait.abandon() == Abandoned::Withdrawn);
    drop(baton);

    let mut baton = shared.acquire_for_blocking(Op::Dequeue).unwrap();
    assert_eq!(baton.read(), 1);
  }

  #[tokio::test]
  async fn parked_operation_receives_direct_hand_off() {
    let shared = Shared::<u32>::new(1, None);

    let mut dequeue = Box::pin(shared.acquire_for(Op::Dequeue));
    assert!(poll_immediate(&mut dequeue).await.is_none());
    assert_eq!(shared.waiter_count(), 1);

    {
      let mut baton = shared.acquire_for(Op::Enqueue).await.unwrap();
      baton.write(9);
    }
    assert_eq!(shared.waiter_count(), 0);

    // The exclusion gate was not reopened: ownership went to the parked dequeue.
    let mut blocked = shared.acquire().unwrap();
    assert!(poll_immediate(&mut blocked).await.is_none());

    let mut baton = poll_immediate(&mut dequeue).await.unwrap().unwrap();
    assert!(!baton.can_wake_next);
    assert_eq!(baton.read(), 9);
    drop(baton);

    // A woken operation releases through the exclusion gate.
    assert!(poll_immediate(&mut blocked).await.is_some());
  }

  #[test]
  fn dispose_is_reported_once() {
    let shared = Shared::<u8>::new(1, Some("once".into()));
    assert!(shared.dispose());
    assert!(!shared.dispose());
    assert!(shared.is_disposed());
    assert_eq!(shared.acquire().err(), Some(Disposed));
  }
}
