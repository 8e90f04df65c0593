//! The concurrent refinement worker.
//!
//! A refinement worker drains completed refinement buffers so the remembered
//! sets stay ahead of the mutators. Workers are long-lived background
//! threads: each one sleeps while `Inactive`, is woken by an upstream
//! activation (a mutator crossing the pending-buffer watermark, or its
//! predecessor in the [`WorkerChain`]), drains bounded batches while
//! `Active`, and puts itself back to sleep once the pending count falls under
//! its deactivation threshold.

use super::chain::WorkerChain;
use super::monitor::WorkerMonitor;
use super::safepoint::SafepointSync;
use crate::pacing::PacingController;
use crate::policy::thresholds::ActivationThresholds;
use crate::util::vtime::elapsed_vtime_ms;
use atomic::{Atomic, Ordering};
use atomic_refcell::{AtomicRef, AtomicRefCell, AtomicRefMut};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

/// The two states of a refinement worker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Blocked on its monitor, consuming no CPU.
    Inactive,
    /// Draining refinement buffers.
    Active,
}

/// The source of refinement work. Implemented by the remembered-set update
/// queue outside this crate; the worker does not interpret the work beyond
/// measuring its duration.
pub trait RefinementWork: Send + Sync + 'static {
    /// The number of completed refinement buffers currently pending.
    fn pending_buffers(&self) -> usize;

    /// Drain one bounded batch, stopping early once the pending count falls
    /// to `stop_at`. Returns true if at least one buffer was processed.
    ///
    /// Region-state mutation inside the batch must be bracketed with the
    /// coordination context's heap lock.
    fn refine_batch(&self, worker_id: usize, stop_at: usize) -> bool;
}

// Error message for borrowing `RefinementWorkerShared::stat`.
const STAT_BORROWED_MSG: &str = "RefinementWorkerShared.stat is already borrowed. This may \
    happen if a diagnostic report runs while the owning worker is updating its counters.";

/// Per-worker diagnostic counters. Written only by the owning worker between
/// units of work; reads from other threads may lag by one unit. Counters
/// other threads write live directly on [`RefinementWorkerShared`] as
/// atomics.
#[derive(Default)]
pub struct WorkerLocalStat {
    /// Batches drained since the worker was spawned.
    pub batches: usize,
}

/// The part of a refinement worker shared with the rest of the subsystem:
/// the activation state machine, the thresholds, and diagnostics. The
/// private [`RefinementWorker`] half is owned by the worker thread itself.
pub struct RefinementWorkerShared {
    ordinal: usize,
    monitor: WorkerMonitor<WorkerState>,
    thresholds: ActivationThresholds,
    /// Virtual (CPU) time this worker has spent refining, in milliseconds.
    /// Written only by the owning thread; monotonic.
    vtime_accum_ms: Atomic<f64>,
    /// Activation wake-ups. Bumped by whichever thread performs the
    /// transition (a predecessor cascading, a mutator notification, or the
    /// primary's own poll), so it cannot live in `stat`.
    activations: AtomicUsize,
    stat: AtomicRefCell<WorkerLocalStat>,
}

impl RefinementWorkerShared {
    pub(crate) fn new(ordinal: usize, activation: usize, deactivation: usize) -> Self {
        Self {
            ordinal,
            monitor: WorkerMonitor::new(WorkerState::Inactive),
            thresholds: ActivationThresholds::new(activation, deactivation),
            vtime_accum_ms: Atomic::new(0.0),
            activations: AtomicUsize::new(0),
            stat: Default::default(),
        }
    }

    /// This worker's position in the chain. Worker 0 is the primary.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn state(&self) -> WorkerState {
        self.monitor.state()
    }

    pub fn is_active(&self) -> bool {
        self.state() == WorkerState::Active
    }

    /// Wake the worker. Idempotent: activating an `Active` worker changes
    /// nothing and has no duplicate side effects. Fire-and-forget; the caller
    /// does not wait for the worker to actually wake.
    pub fn activate(&self) {
        let newly_activated = self.monitor.transition(|s| {
            if *s == WorkerState::Inactive {
                *s = WorkerState::Active;
                true
            } else {
                false
            }
        });
        if newly_activated {
            trace!("Refinement worker {} activated", self.ordinal);
            self.activations.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Put the worker back to sleep. Idempotent.
    pub fn deactivate(&self) {
        let newly_deactivated = self.monitor.transition(|s| {
            if *s == WorkerState::Active {
                *s = WorkerState::Inactive;
                true
            } else {
                false
            }
        });
        if newly_deactivated {
            trace!("Refinement worker {} deactivated", self.ordinal);
        }
    }

    pub fn thresholds(&self) -> &ActivationThresholds {
        &self.thresholds
    }

    /// Activation wake-ups so far.
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    /// Accumulated refinement virtual time. Diagnostic only: a concurrent
    /// read may be stale by one unit of work.
    pub fn accumulated_vtime_ms(&self) -> f64 {
        self.vtime_accum_ms.load(Ordering::Acquire)
    }

    fn add_vtime_ms(&self, elapsed: f64) {
        debug_assert!(elapsed >= 0.0);
        // Single writer: the owning thread. Plain load + store is enough.
        let accum = self.vtime_accum_ms.load(Ordering::Relaxed);
        self.vtime_accum_ms.store(accum + elapsed, Ordering::Release);
    }

    pub fn borrow_stat(&self) -> AtomicRef<WorkerLocalStat> {
        self.stat.try_borrow().expect(STAT_BORROWED_MSG)
    }

    fn borrow_stat_mut(&self) -> AtomicRefMut<WorkerLocalStat> {
        self.stat.try_borrow_mut().expect(STAT_BORROWED_MSG)
    }

    pub(crate) fn request_stop(&self) {
        self.monitor.request_stop();
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.monitor.stop_requested()
    }
}

/// A refinement worker. This part is privately owned by its thread.
pub struct RefinementWorker {
    /// Added to the ordinal to form the worker id reported to the work
    /// source, so refinement workers occupy a distinct id range from other
    /// GC threads.
    worker_id_offset: usize,
    shared: Arc<RefinementWorkerShared>,
    chain: Arc<WorkerChain>,
    work: Arc<dyn RefinementWork>,
    safepoint: Arc<dyn SafepointSync>,
    pacing: PacingController,
}

impl RefinementWorker {
    pub(crate) fn new(
        worker_id_offset: usize,
        shared: Arc<RefinementWorkerShared>,
        chain: Arc<WorkerChain>,
        work: Arc<dyn RefinementWork>,
        safepoint: Arc<dyn SafepointSync>,
        pacing: PacingController,
    ) -> Self {
        Self {
            worker_id_offset,
            shared,
            chain,
            work,
            safepoint,
            pacing,
        }
    }

    fn worker_id(&self) -> usize {
        self.worker_id_offset + self.shared.ordinal
    }

    /// The worker loop. Runs until a stop request is observed; an in-flight
    /// batch always completes before the request is honored.
    pub fn run(&mut self) {
        let ordinal = self.shared.ordinal;
        debug!("Refinement worker {} running", ordinal);
        loop {
            if !self.wait_for_activation() {
                break;
            }
            self.run_active_phase();
            if self.shared.stop_requested() {
                break;
            }
        }
        debug!(
            "Refinement worker {} exiting, vtime {:.1}ms",
            ordinal,
            self.shared.accumulated_vtime_ms()
        );
    }

    /// Block until activated or stopped. Returns false on stop.
    ///
    /// The primary worker has no predecessor to wake it, so it waits with a
    /// timeout at the pacing interval and self-activates when the pending
    /// count crosses its watermark; secondary workers block indefinitely
    /// until their predecessor cascades to them.
    fn wait_for_activation(&mut self) -> bool {
        let is_primary = self.shared.ordinal == 0;
        loop {
            if is_primary {
                let interval = Duration::from_secs_f64(self.pacing.interval_ms() / 1e3);
                match self
                    .shared
                    .monitor
                    .wait_for_timeout(|s| *s == WorkerState::Active, interval)
                {
                    Err(_) => return false,
                    Ok(true) => return true,
                    Ok(false) => {
                        // Timed poll: check the watermark ourselves.
                        let pending = self.work.pending_buffers();
                        if self.shared.thresholds.should_activate(pending) {
                            self.shared.activate();
                            return true;
                        }
                        // Nothing to do; stretch the polling interval.
                        self.pacing.next_interval(0.0);
                    }
                }
            } else {
                return self
                    .shared
                    .monitor
                    .wait_for(|s| *s == WorkerState::Active)
                    .is_ok();
            }
        }
    }

    /// Drain batches until the pending count falls under the deactivation
    /// watermark, the source runs dry, or a stop request arrives.
    fn run_active_phase(&mut self) {
        while !self.shared.stop_requested() {
            if self.safepoint.should_yield() {
                self.safepoint.yield_now();
            }

            let pending = self.work.pending_buffers();
            if self.shared.thresholds.should_deactivate(pending) {
                self.shared.deactivate();
                return;
            }
            // Cascade before taking the batch, so the successor overlaps with
            // it rather than waiting for it.
            self.chain.activate_successor_if_needed(self.shared.ordinal, pending);

            let stop_at = self.shared.thresholds.deactivation_threshold();
            let start = elapsed_vtime_ms();
            let did_work = self.work.refine_batch(self.worker_id(), stop_at);
            let elapsed = elapsed_vtime_ms() - start;

            self.shared.add_vtime_ms(elapsed);
            self.pacing
                .next_interval(if did_work { elapsed } else { 0.0 });

            if !did_work {
                self.shared.deactivate();
                return;
            }
            self.shared.borrow_stat_mut().batches += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_is_idempotent() {
        let shared = RefinementWorkerShared::new(0, 10, 4);
        assert_eq!(shared.state(), WorkerState::Inactive);
        shared.activate();
        shared.activate();
        assert_eq!(shared.state(), WorkerState::Active);
        assert_eq!(shared.activations(), 1);
    }

    /// Activation arrives from other threads (a cascading predecessor, a
    /// mutator notification) while the owning worker updates its own
    /// counters; neither side may disturb the other.
    #[test]
    fn cross_thread_activation_does_not_disturb_owner_counters() {
        const ITERATIONS: usize = 100_000;
        let shared = Arc::new(RefinementWorkerShared::new(0, 10, 4));

        std::thread::scope(|scope| {
            let waker = shared.clone();
            scope.spawn(move || {
                for _ in 0..ITERATIONS {
                    waker.activate();
                    waker.deactivate();
                }
            });
            // The owning worker bumping `batches` between units of work.
            for _ in 0..ITERATIONS {
                shared.borrow_stat_mut().batches += 1;
            }
        });

        assert_eq!(shared.borrow_stat().batches, ITERATIONS);
        assert_eq!(shared.activations(), ITERATIONS);
    }

    #[test]
    fn deactivation_is_idempotent() {
        let shared = RefinementWorkerShared::new(0, 10, 4);
        shared.deactivate();
        assert_eq!(shared.state(), WorkerState::Inactive);
        shared.activate();
        shared.deactivate();
        shared.deactivate();
        assert_eq!(shared.state(), WorkerState::Inactive);
    }

    #[test]
    fn vtime_is_monotonic_and_readable_concurrently() {
        let shared = RefinementWorkerShared::new(0, 10, 4);
        shared.add_vtime_ms(1.5);
        shared.add_vtime_ms(2.5);
        assert!((shared.accumulated_vtime_ms() - 4.0).abs() < 1e-9);
    }
}
