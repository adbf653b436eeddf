//! Coordination primitives: the exclusion gate and the hand-off gate.

pub(crate) mod gate;
pub(crate) mod handoff;

pub(crate) use gate::{Abandoned, Gate, GateWait};
pub(crate) use handoff::HandoffGate;
