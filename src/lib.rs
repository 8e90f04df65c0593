//! congc is a coordination framework for concurrent garbage collection
//! background work. It provides the scheduling discipline that lets refinement
//! and marking threads run alongside mutator threads without racing the
//! collector they serve: activation/deactivation thresholds, dynamic pacing
//! from observed virtual time, prompt safepoint yielding, and a strict
//! state-machine lifecycle for every background thread.
//!
//! Logically, this crate includes these major parts:
//! * [Scheduler](scheduler/index.html): the worker state machines
//!   ([`RefinementWorker`], [`ConcurrentMarkThread`]), the activation cascade
//!   over a fixed [`WorkerChain`], and the condition-variable monitor the
//!   workers block on.
//! * [Policy](policy/index.html): activation thresholds read concurrently by
//!   workers and retuned by the collector policy, and the per-age survivor
//!   rate statistics ([`SurvRateGroup`]) that feed pacing decisions.
//! * [Pacing](pacing/index.html): geometric back-off/speed-up of the worker
//!   polling interval from observed work durations.
//! * Utilities: the preserved mark store used during evacuation failure, the
//!   mark word encoding it preserves, and thread virtual-time measurement.
//!
//! The marking and refinement algorithms themselves are external
//! collaborators, reached through the [`MarkingWork`] and [`RefinementWork`]
//! traits. A single process-wide [`GcCoordination`] context owns the worker
//! threads from spawn to shutdown; there are no file-scope singletons.

#[macro_use]
extern crate log;
#[macro_use]
extern crate static_assertions;

mod coordination;
pub mod pacing;
pub mod policy;
pub mod scheduler;
pub mod util;

pub use crate::coordination::{GcCoordination, HeapLock};
pub use crate::pacing::PacingController;
pub use crate::policy::surv_rate::{SurvRateGroup, SurvRatePredictor};
pub use crate::policy::thresholds::ActivationThresholds;
pub use crate::scheduler::chain::WorkerChain;
pub use crate::scheduler::marking::{ConcurrentMarkThread, CycleState, MarkingWork};
pub use crate::scheduler::safepoint::SafepointSync;
pub use crate::scheduler::worker::{RefinementWork, RefinementWorker, WorkerState};
pub use crate::util::address::{Address, ObjectReference};
pub use crate::util::mark_word::MarkWord;
pub use crate::util::preserved_marks::{PreservedMarkSets, PreservedMarkStore};
