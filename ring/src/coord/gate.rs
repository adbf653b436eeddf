//! A binary signal that supports both synchronous and asynchronous waiters.
//!
//! A `Gate` is either open or closed. Entering an open gate consumes it
//! without suspending; entering a closed gate parks the caller in a FIFO
//! queue. `signal` hands the gate to exactly one parked waiter, or opens it
//! when nobody is waiting. Ownership handed to a waiter never passes
//! through the open state, so a newcomer cannot steal it.
//!
//! The state is protected by a `parking_lot::Mutex` that is only held for
//! bookkeeping. Each parked waiter owns a ticket that records whether it
//! has been granted the gate, so a wake-up is never lost between the grant
//! and the moment the waiter is next polled (or unparked).

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};

use parking_lot::Mutex;

use crate::error::Disposed;

/// An enum representing either a sync or async waiter.
#[derive(Debug)]
enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  /// Wakes the underlying thread or task.
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }

  /// Checks if this waiter would be woken by the given waker.
  fn will_wake(&self, waker: &Waker) -> bool {
    match self {
      Waiter::Async(self_waker) => self_waker.will_wake(waker),
      Waiter::Sync(_) => false,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TicketStatus {
  Parked,
  Granted,
  Disposed,
}

#[derive(Debug)]
struct Ticket {
  status: TicketStatus,
  waiter: Option<Waiter>,
}

type TicketRef = Arc<Mutex<Ticket>>;

/// The internal state of the `Gate`, protected by a `Mutex`.
#[derive(Debug)]
struct GateInternal {
  open: bool,
  disposed: bool,
  /// Fair (FIFO) queue of parked tickets. Every ticket in here is `Parked`.
  parked: VecDeque<TicketRef>,
}

/// What a dropped wait left behind, as reported by [`GateWait::abandon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Abandoned {
  /// The wait had already completed or the gate was disposed.
  Nothing,
  /// The wait was still parked and has been removed from the queue.
  Withdrawn,
  /// The gate had been handed to this wait, but nobody observed it. The
  /// owner of the wait is now responsible for passing it on.
  Grant,
}

pub(crate) struct Gate {
  internal: Mutex<GateInternal>,
}

impl fmt::Debug for Gate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let internal = self.internal.lock();
    f.debug_struct("Gate")
      .field("open", &internal.open)
      .field("disposed", &internal.disposed)
      .field("parked", &internal.parked.len())
      .finish()
  }
}

impl Gate {
  /// Creates a gate in the given state.
  pub(crate) fn new(open: bool) -> Self {
    Self {
      internal: Mutex::new(GateInternal {
        open,
        disposed: false,
        parked: VecDeque::new(),
      }),
    }
  }

  /// Enters the gate. If it is open, the returned wait is already
  /// satisfied; otherwise the caller is queued behind earlier waiters.
  pub(crate) fn enter(&self) -> Result<GateWait<'_>, Disposed> {
    let mut internal = self.internal.lock();
    if internal.disposed {
      return Err(Disposed);
    }
    if internal.open {
      internal.open = false;
      return Ok(GateWait {
        gate: self,
        state: WaitState::Passed,
      });
    }
    Ok(self.park_locked(&mut internal))
  }

  /// Queues the caller regardless of the gate's state. The returned wait
  /// only completes through [`signal`](Self::signal) or
  /// [`signal_parked`](Self::signal_parked).
  pub(crate) fn park(&self) -> Result<GateWait<'_>, Disposed> {
    let mut internal = self.internal.lock();
    if internal.disposed {
      return Err(Disposed);
    }
    Ok(self.park_locked(&mut internal))
  }

  fn park_locked(&self, internal: &mut GateInternal) -> GateWait<'_> {
    let ticket = Arc::new(Mutex::new(Ticket {
      status: TicketStatus::Parked,
      waiter: None,
    }));
    internal.parked.push_back(ticket.clone());
    GateWait {
      gate: self,
      state: WaitState::Parked(ticket),
    }
  }

  /// Hands the gate to the oldest parked waiter, or opens it if nobody is
  /// waiting. A no-op once the gate is disposed.
  pub(crate) fn signal(&self) {
    let mut internal = self.internal.lock();
    if internal.disposed {
      return;
    }
    debug_assert!(!internal.open, "gate signalled while already open");
    match Self::grant_front(&mut internal) {
      Some(waiter) => {
        drop(internal);
        if let Some(waiter) = waiter {
          waiter.wake();
        }
      }
      None => internal.open = true,
    }
  }

  /// Hands the gate to the oldest parked waiter. Never opens the gate.
  /// Returns `false` if nobody was parked (or the gate is disposed).
  pub(crate) fn signal_parked(&self) -> bool {
    let mut internal = self.internal.lock();
    if internal.disposed {
      return false;
    }
    match Self::grant_front(&mut internal) {
      Some(waiter) => {
        drop(internal);
        if let Some(waiter) = waiter {
          waiter.wake();
        }
        true
      }
      None => false,
    }
  }

  /// Marks the front ticket as granted and returns its registered waiter.
  /// `None` means the queue was empty.
  fn grant_front(internal: &mut GateInternal) -> Option<Option<Waiter>> {
    let ticket = internal.parked.pop_front()?;
    let mut ticket = ticket.lock();
    ticket.status = TicketStatus::Granted;
    Some(ticket.waiter.take())
  }

  /// Number of waiters currently parked on the gate.
  pub(crate) fn parked(&self) -> usize {
    self.internal.lock().parked.len()
  }

  pub(crate) fn is_disposed(&self) -> bool {
    self.internal.lock().disposed
  }

  /// Disposes the gate and wakes every parked waiter with [`Disposed`].
  /// Returns `false` if the gate had already been disposed.
  pub(crate) fn dispose(&self) -> bool {
    let mut internal = self.internal.lock();
    if internal.disposed {
      return false;
    }
    internal.disposed = true;
    internal.open = false;

    let mut to_wake = Vec::with_capacity(internal.parked.len());
    for ticket in internal.parked.drain(..) {
      let mut ticket = ticket.lock();
      ticket.status = TicketStatus::Disposed;
      if let Some(waiter) = ticket.waiter.take() {
        to_wake.push(waiter);
      }
    }
    drop(internal);

    for waiter in to_wake {
      waiter.wake();
    }
    true
  }
}

#[derive(Debug)]
enum WaitState {
  /// The gate was open on entry and has been consumed by this wait.
  Passed,
  Parked(TicketRef),
  Done,
}

/// A pending entry through a [`Gate`].
///
/// Resolves to `Ok(())` once the caller owns the gate, or `Err(Disposed)`
/// if the gate was disposed first. Can be awaited or waited on by blocking
/// the current thread.
#[must_use = "a gate wait holds or queues for the gate and must be completed or abandoned"]
#[derive(Debug)]
pub(crate) struct GateWait<'a> {
  gate: &'a Gate,
  state: WaitState,
}

impl GateWait<'_> {
  fn poll_with<F>(&mut self, register: F) -> Poll<Result<(), Disposed>>
  where
    F: FnOnce(&mut Option<Waiter>),
  {
    let outcome = match &self.state {
      WaitState::Passed => Ok(()),
      WaitState::Parked(ticket) => {
        let mut ticket = ticket.lock();
        match ticket.status {
          TicketStatus::Granted => Ok(()),
          TicketStatus::Disposed => Err(Disposed),
          TicketStatus::Parked => {
            register(&mut ticket.waiter);
            return Poll::Pending;
          }
        }
      }
      WaitState::Done => panic!("GateWait polled after completion"),
    };
    self.state = WaitState::Done;
    Poll::Ready(outcome)
  }

  /// Blocks the current thread until the gate is handed to this wait.
  pub(crate) fn wait_blocking(&mut self) -> Result<(), Disposed> {
    loop {
      match self.poll_with(|slot| *slot = Some(Waiter::Sync(thread::current()))) {
        Poll::Ready(outcome) => return outcome,
        Poll::Pending => thread::park(),
      }
    }
  }

  /// Gives up on the wait. Must be called by owners that are dropped
  /// before the wait completed; see [`Abandoned`] for the possible outcomes.
  pub(crate) fn abandon(&mut self) -> Abandoned {
    match mem::replace(&mut self.state, WaitState::Done) {
      WaitState::Done => Abandoned::Nothing,
      WaitState::Passed => Abandoned::Grant,
      WaitState::Parked(ticket) => {
        // Lock order: gate, then ticket. `signal` uses the same order.
        let mut internal = self.gate.internal.lock();
        let status = ticket.lock().status;
        match status {
          TicketStatus::Parked => {
            internal.parked.retain(|t| !Arc::ptr_eq(t, &ticket));
            Abandoned::Withdrawn
          }
          TicketStatus::Granted => Abandoned::Grant,
          TicketStatus::Disposed => Abandoned::Nothing,
        }
      }
    }
  }
}

impl Future for GateWait<'_> {
  type Output = Result<(), Disposed>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    this.poll_with(|slot| {
      // Avoid re-cloning the waker if the task polls again unchanged.
      if !slot.as_ref().is_some_and(|w| w.will_wake(cx.waker())) {
        *slot = Some(Waiter::Async(cx.waker().clone()));
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use futures_util::future::poll_immediate;
  use std::time::Duration;
  use tokio::time::timeout;

  #[test]
  fn open_gate_passes_then_closes() {
    let gate = Gate::new(true);
    let mut first = gate.enter().unwrap();
    assert_eq!(first.wait_blocking(), Ok(()));

    let mut second = gate.enter().unwrap();
    assert_eq!(gate.parked(), 1);
    assert_eq!(second.abandon(), Abandoned::Withdrawn);
    assert_eq!(gate.parked(), 0);
  }

  #[test]
  fn signal_without_waiters_opens() {
    let gate = Gate::new(false);
    gate.signal();
    let mut wait = gate.enter().unwrap();
    assert_eq!(wait.abandon(), Abandoned::Grant);
  }

  #[test]
  fn signal_parked_never_opens() {
    let gate = Gate::new(false);
    assert!(!gate.signal_parked());
    let mut wait = gate.park().unwrap();
    assert_eq!(gate.parked(), 1);
    assert!(gate.signal_parked());
    assert_eq!(wait.wait_blocking(), Ok(()));
    assert!(!gate.signal_parked());
  }

  #[tokio::test]
  async fn signal_wakes_in_fifo_order() {
    let gate = Gate::new(false);
    let mut first = gate.enter().unwrap();
    let mut second = gate.enter().unwrap();
    assert!(poll_immediate(&mut first).await.is_none());
    assert!(poll_immediate(&mut second).await.is_none());

    gate.signal();
    assert!(poll_immediate(&mut second).await.is_none());
    assert_eq!(poll_immediate(&mut first).await, Some(Ok(())));

    gate.signal();
    assert_eq!(poll_immediate(&mut second).await, Some(Ok(())));
  }

  #[tokio::test]
  async fn async_waiter_is_woken_by_signal() {
    let gate = Arc::new(Gate::new(false));

    let gate_for_task = gate.clone();
    let task = tokio::spawn(async move { gate_for_task.enter().unwrap().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());
    gate.signal();

    let outcome = timeout(Duration::from_millis(500), task)
      .await
      .expect("waiter was not woken")
      .unwrap();
    assert_eq!(outcome, Ok(()));
  }

  #[test]
  fn blocking_waiter_is_unparked_by_signal() {
    let gate = Arc::new(Gate::new(false));

    let gate_clone = gate.clone();
    let handle = thread::spawn(move || gate_clone.enter().unwrap().wait_blocking());

    thread::sleep(Duration::from_millis(100));
    assert!(!handle.is_finished(), "Thread should have blocked");

    gate.signal();
    assert_eq!(handle.join().expect("Thread panicked"), Ok(()));
  }

  #[test]
  fn dispose_wakes_parked_and_rejects_new_entries() {
    let gate = Arc::new(Gate::new(false));

    let gate_clone = gate.clone();
    let handle = thread::spawn(move || gate_clone.park().unwrap().wait_blocking());
    thread::sleep(Duration::from_millis(100));

    assert!(gate.dispose());
    assert!(!gate.dispose());
    assert!(gate.is_disposed());
    assert_eq!(handle.join().unwrap(), Err(Disposed));

    assert_eq!(gate.enter().err(), Some(Disposed));
    assert_eq!(gate.park().err(), Some(Disposed));
    // Signalling a disposed gate is ignored.
    gate.signal();
    assert!(!gate.signal_parked());
  }

  #[test]
  fn abandoned_grant_is_reported() {
    let gate = Gate::new(false);
    let mut wait = gate.park().unwrap();
    gate.signal();
    assert_eq!(wait.abandon(), Abandoned::Grant);
    assert_eq!(wait.abandon(), Abandoned::Nothing);
  }
}
