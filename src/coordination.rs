//! The process-wide GC coordination context.
//!
//! One [`GcCoordination`] is constructed at VM startup and torn down at VM
//! shutdown. It owns the refinement worker chain and the concurrent marking
//! thread, spawns them once, and is the single place their lifecycle and
//! shared state live; there are no file-scope singletons in this subsystem.

use crate::pacing::PacingController;
use crate::scheduler::chain::WorkerChain;
use crate::scheduler::marking::{ConcurrentMarkShared, ConcurrentMarkThread, MarkingWork};
use crate::scheduler::safepoint::SafepointSync;
use crate::scheduler::worker::{RefinementWork, RefinementWorker};
use crate::util::options::Options;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// Worker ids reported to the refinement work source start here; global id 0
/// belongs to the marking thread.
const REFINEMENT_WORKER_ID_OFFSET: usize = 1;

/// The heap lock. Any region-state mutation performed inside a unit of
/// concurrent work must hold it, so the mutation cannot interleave with a
/// pause that inspects the same regions. The embedder creates the lock,
/// shares it with its work implementations, and hands it to
/// [`GcCoordination::new`] before any worker thread exists.
#[derive(Default)]
pub struct HeapLock {
    lock: Mutex<()>,
}

impl HeapLock {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap()
    }
}

/// The GC coordination context: the inbound interface the collector policy
/// calls, and the owner of every background thread in this subsystem.
pub struct GcCoordination {
    options: Options,
    heap_lock: Arc<HeapLock>,
    chain: Arc<WorkerChain>,
    marking: Arc<ConcurrentMarkShared>,
    refinement_handles: Vec<JoinHandle<()>>,
    marking_handle: Option<JoinHandle<()>>,
}

impl GcCoordination {
    /// Build the context and spawn all background threads. The threads run
    /// for the lifetime of the process until [`stop`](Self::stop).
    pub fn new(
        options: Options,
        heap_lock: Arc<HeapLock>,
        refinement_work: Arc<dyn RefinementWork>,
        marking_work: Arc<dyn MarkingWork>,
        safepoint: Arc<dyn SafepointSync>,
    ) -> Self {
        let chain = Arc::new(WorkerChain::new(&options));
        let marking = Arc::new(ConcurrentMarkShared::new());

        info!(
            "Spawning {} refinement workers (activation {}, deactivation {}, step {}) \
             and the concurrent mark thread",
            options.threads,
            options.activation_threshold,
            options.deactivation_threshold,
            options.threshold_step
        );

        let refinement_handles = (0..chain.len())
            .map(|ordinal| {
                let mut worker = RefinementWorker::new(
                    REFINEMENT_WORKER_ID_OFFSET,
                    chain.worker(ordinal).clone(),
                    chain.clone(),
                    refinement_work.clone(),
                    safepoint.clone(),
                    PacingController::new(options.initial_interval_ms, options.max_interval_ms),
                );
                std::thread::Builder::new()
                    .name(format!("congc-refine-{}", ordinal))
                    .spawn(move || worker.run())
                    .expect("failed to spawn a refinement worker thread")
            })
            .collect();

        let marking_handle = {
            let mut thread = ConcurrentMarkThread::new(
                marking.clone(),
                marking_work,
                safepoint,
                PacingController::new(options.initial_interval_ms, options.max_interval_ms),
                std::time::Duration::from_millis(options.safepoint_poll_ms),
            );
            Some(
                std::thread::Builder::new()
                    .name("congc-mark".to_string())
                    .spawn(move || thread.run())
                    .expect("failed to spawn the concurrent mark thread"),
            )
        };

        Self {
            options,
            heap_lock,
            chain,
            marking,
            refinement_handles,
            marking_handle,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The heap lock collaborators bracket region-state mutation with.
    pub fn heap_lock(&self) -> &Arc<HeapLock> {
        &self.heap_lock
    }

    pub fn chain(&self) -> &Arc<WorkerChain> {
        &self.chain
    }

    pub fn marking(&self) -> &Arc<ConcurrentMarkShared> {
        &self.marking
    }

    /// Begin a concurrent marking cycle. Fatal if one is already in
    /// progress; callers gate on [`during_cycle`](Self::during_cycle).
    pub fn start_cycle(&self) {
        self.marking.start_cycle();
    }

    pub fn during_cycle(&self) -> bool {
        self.marking.during_cycle()
    }

    /// Mutator-side hook: called after enqueueing completed refinement
    /// buffers. Wakes the primary worker once the count crosses its
    /// watermark; the rest of the chain cascades from there.
    pub fn notify_pending_buffers(&self, pending: usize) {
        let primary = self.chain.primary();
        if primary.thresholds().should_activate(pending) {
            primary.activate();
        }
    }

    /// Retune the activation/deactivation watermarks across the whole chain.
    pub fn update_thresholds(&self, activation: usize, deactivation: usize) {
        self.chain.update_thresholds(activation, deactivation);
    }

    /// Best-effort diagnostic report of per-thread virtual times and
    /// activity. Never blocks a worker.
    pub fn print_summary(&self) {
        debug!(
            "Marking: {:?}, {} cycles completed, vtime {:.1}ms",
            self.marking.state(),
            self.marking.cycles_completed(),
            self.marking.accumulated_vtime_ms()
        );
        for ordinal in 0..self.chain.len() {
            let worker = self.chain.worker(ordinal);
            debug!(
                "Refinement worker {}: {:?}, {} batches over {} activations, vtime {:.1}ms",
                ordinal,
                worker.state(),
                worker.borrow_stat().batches,
                worker.activations(),
                worker.accumulated_vtime_ms()
            );
        }
    }

    /// Request every background thread to exit and join them. Each thread
    /// observes the request at the top of its next loop iteration; in-flight
    /// units of work complete first. Idempotent.
    pub fn stop(&mut self) {
        if self.marking_handle.is_none() && self.refinement_handles.is_empty() {
            return;
        }
        info!("Stopping GC coordination threads");
        self.chain.request_stop_all();
        self.marking.request_stop();
        for handle in self.refinement_handles.drain(..) {
            handle.join().expect("a refinement worker panicked");
        }
        if let Some(handle) = self.marking_handle.take() {
            handle.join().expect("the concurrent mark thread panicked");
        }
    }
}

impl Drop for GcCoordination {
    fn drop(&mut self) {
        self.stop();
    }
}
