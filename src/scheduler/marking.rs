//! The concurrent marking thread.
//!
//! One marking cycle runs Idle → Started → InProgress → Idle. The collector
//! policy sets `Started` at an initial-mark pause; the thread notices, moves
//! to `InProgress`, runs marking increments concurrently with the mutators
//! (yielding at safepoints and pacing itself between increments), clears the
//! next marking bitmap, and returns to `Idle`. Starting a cycle while one is
//! in progress indicates two overlapping cycles and is fatal.

use super::monitor::WorkerMonitor;
use super::safepoint::SafepointSync;
use crate::pacing::PacingController;
use crate::util::vtime::elapsed_vtime_ms;
use atomic::{Atomic, Ordering};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The cycle states of the concurrent marking thread.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CycleState {
    /// No cycle in progress.
    Idle,
    /// A cycle has been requested at an initial-mark pause; the marking
    /// thread has not picked it up yet.
    Started,
    /// The marking thread is doing the cycle's concurrent work.
    InProgress,
}

/// The marking algorithm, implemented outside this crate. The thread does
/// not interpret the work beyond measuring its duration.
pub trait MarkingWork: Send + Sync + 'static {
    /// Run one bounded marking increment. Returns true once the cycle's
    /// concurrent marking is complete.
    fn mark_step(&self) -> bool;

    /// Clear one chunk of the next marking bitmap. Returns true once the
    /// whole bitmap is clear. Chunked so the thread can yield to safepoints
    /// mid-clear.
    fn clear_next_bitmap_step(&self) -> bool;
}

/// The part of the marking thread shared with the collector policy: the
/// cycle state machine and diagnostics.
pub struct ConcurrentMarkShared {
    monitor: WorkerMonitor<CycleState>,
    /// Virtual (CPU) time spent marking, in milliseconds. Written only by
    /// the marking thread; monotonic.
    vtime_accum_ms: Atomic<f64>,
    cycles_completed: AtomicUsize,
}

impl ConcurrentMarkShared {
    pub(crate) fn new() -> Self {
        Self {
            monitor: WorkerMonitor::new(CycleState::Idle),
            vtime_accum_ms: Atomic::new(0.0),
            cycles_completed: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> CycleState {
        self.monitor.state()
    }

    /// True from the moment a cycle is started until its concurrent work,
    /// including the bitmap clear, has finished.
    pub fn during_cycle(&self) -> bool {
        self.state() != CycleState::Idle
    }

    /// Begin a marking cycle. Called at an initial-mark pause. Starting a
    /// cycle while `during_cycle()` is true means two cycles overlap; that is
    /// a collector bug and aborts rather than corrupting the marking state.
    pub fn start_cycle(&self) {
        self.monitor.transition(|s| {
            assert_eq!(
                *s,
                CycleState::Idle,
                "starting a marking cycle while the previous one is {:?}",
                *s
            );
            *s = CycleState::Started;
        });
        debug!("Marking cycle requested");
    }

    /// The marking thread picks the cycle up.
    fn begin_cycle_work(&self) {
        self.monitor.transition(|s| {
            assert_eq!(*s, CycleState::Started, "cycle work without a start");
            *s = CycleState::InProgress;
        });
    }

    /// The marking thread finished everything, including the bitmap clear.
    fn finish_cycle(&self) {
        self.monitor.transition(|s| {
            assert_eq!(*s, CycleState::InProgress, "finishing a cycle that never began");
            *s = CycleState::Idle;
        });
        self.cycles_completed
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn cycles_completed(&self) -> usize {
        self.cycles_completed
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Accumulated marking virtual time. Diagnostic only; may lag by one
    /// increment.
    pub fn accumulated_vtime_ms(&self) -> f64 {
        self.vtime_accum_ms.load(Ordering::Acquire)
    }

    fn add_vtime_ms(&self, elapsed: f64) {
        debug_assert!(elapsed >= 0.0);
        let accum = self.vtime_accum_ms.load(Ordering::Relaxed);
        self.vtime_accum_ms.store(accum + elapsed, Ordering::Release);
    }

    pub(crate) fn request_stop(&self) {
        self.monitor.request_stop();
    }
}

impl Default for ConcurrentMarkShared {
    fn default() -> Self {
        Self::new()
    }
}

/// The concurrent marking thread. This part is privately owned by its
/// thread.
pub struct ConcurrentMarkThread {
    shared: Arc<ConcurrentMarkShared>,
    work: Arc<dyn MarkingWork>,
    safepoint: Arc<dyn SafepointSync>,
    pacing: PacingController,
    /// Upper bound on how long a paced delay may go without re-checking the
    /// safepoint and stop flags.
    safepoint_poll: Duration,
}

impl ConcurrentMarkThread {
    pub(crate) fn new(
        shared: Arc<ConcurrentMarkShared>,
        work: Arc<dyn MarkingWork>,
        safepoint: Arc<dyn SafepointSync>,
        pacing: PacingController,
        safepoint_poll: Duration,
    ) -> Self {
        Self {
            shared,
            work,
            safepoint,
            pacing,
            safepoint_poll,
        }
    }

    /// The marking thread loop. Sleeps between cycles on the monitor (a
    /// predicate wait, not a timed sleep); a stop request wins over any
    /// state, and an in-flight marking increment always completes before the
    /// request is honored.
    pub fn run(&mut self) {
        debug!("Concurrent mark thread running");
        loop {
            if self
                .shared
                .monitor
                .wait_for(|s| *s == CycleState::Started)
                .is_err()
            {
                break;
            }
            self.shared.begin_cycle_work();
            info!("Concurrent marking cycle started");

            if !self.run_marking() || !self.clear_next_bitmap() {
                // Stop request mid-cycle: VM shutdown. Leave without touching
                // the cycle state further.
                break;
            }

            self.shared.finish_cycle();
            info!(
                "Concurrent marking cycle finished, marking vtime {:.1}ms",
                self.shared.accumulated_vtime_ms()
            );
        }
        debug!("Concurrent mark thread exiting");
    }

    /// Run marking increments until the work reports completion. Returns
    /// false if a stop request was observed.
    fn run_marking(&mut self) -> bool {
        loop {
            if self.shared.monitor.stop_requested() {
                return false;
            }
            if self.safepoint.should_yield() {
                self.safepoint.yield_now();
            }

            let start = elapsed_vtime_ms();
            let finished = self.work.mark_step();
            let elapsed = elapsed_vtime_ms() - start;
            self.shared.add_vtime_ms(elapsed);
            let interval = self.pacing.next_interval(elapsed);

            if finished {
                return true;
            }
            // Paced delay before the next increment, interruptible by a stop
            // request. Sliced so a safepoint is noticed within the poll
            // interval even when pacing has stretched the delay out.
            let deadline = Instant::now() + Duration::from_secs_f64(interval / 1e3);
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let slice = (deadline - now).min(self.safepoint_poll);
                if self
                    .shared
                    .monitor
                    .wait_for_timeout(|_| false, slice)
                    .is_err()
                {
                    return false;
                }
                if self.safepoint.should_yield() {
                    self.safepoint.yield_now();
                }
            }
        }
    }

    /// Clear the next marking bitmap in chunks, yielding between chunks.
    /// Returns false if a stop request was observed.
    fn clear_next_bitmap(&mut self) -> bool {
        loop {
            if self.shared.monitor.stop_requested() {
                return false;
            }
            if self.safepoint.should_yield() {
                self.safepoint.yield_now();
            }
            if self.work.clear_next_bitmap_step() {
                return true;
            }
        }
    }
}
