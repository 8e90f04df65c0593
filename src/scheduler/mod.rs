//! The concurrent worker scheduler: the monitor the workers block on, the
//! refinement worker state machine and its activation chain, and the
//! concurrent marking thread's cycle state machine.

pub mod chain;
pub mod marking;
mod monitor;
pub mod safepoint;
pub mod worker;
