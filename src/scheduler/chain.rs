//! The refinement worker chain.
//!
//! Workers form a fixed-size, forward-only chain: each worker knows only its
//! immediate successor, and activates it when the load it observes crosses
//! its own activation watermark. Deactivation is never cascaded; a worker
//! puts only itself to sleep. The chain is an indexed vector of shared worker
//! handles, so "successor" is ordinal arithmetic rather than a pointer.

use super::worker::RefinementWorkerShared;
use crate::util::options::Options;
use std::sync::Arc;

/// The ordered sequence of refinement workers. Built once at collector
/// initialization; never resized.
pub struct WorkerChain {
    workers: Vec<Arc<RefinementWorkerShared>>,
    threshold_step: usize,
}

impl WorkerChain {
    /// Build the chain from the configured worker count and threshold
    /// ladder: worker `i` gets thresholds spread `i * threshold_step` above
    /// the base pair, so successors wake under progressively higher load.
    pub(crate) fn new(options: &Options) -> Self {
        let workers = (0..options.threads)
            .map(|ordinal| {
                let (activation, deactivation) = options.thresholds_for(ordinal);
                Arc::new(RefinementWorkerShared::new(ordinal, activation, deactivation))
            })
            .collect();
        Self {
            workers,
            threshold_step: options.threshold_step,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// The shared handle of one worker.
    pub fn worker(&self, ordinal: usize) -> &Arc<RefinementWorkerShared> {
        &self.workers[ordinal]
    }

    /// The primary worker: the head of the chain, the only worker that polls
    /// for load on its own.
    pub fn primary(&self) -> &Arc<RefinementWorkerShared> {
        &self.workers[0]
    }

    /// Called by worker `ordinal` after observing `load` pending buffers. If
    /// the load crosses that worker's own activation watermark and an
    /// inactive successor exists, wake it. Fire-and-forget: the predecessor
    /// does not wait for the successor to come up, and workers past the
    /// immediate successor are never touched.
    pub fn activate_successor_if_needed(&self, ordinal: usize, load: usize) {
        let Some(successor) = self.workers.get(ordinal + 1) else {
            return;
        };
        if self.workers[ordinal].thresholds().should_activate(load) && !successor.is_active() {
            trace!(
                "Refinement worker {} cascading activation to {} at load {}",
                ordinal,
                ordinal + 1,
                load
            );
            successor.activate();
        }
    }

    /// Re-derive every worker's threshold pair from a new base pair, keeping
    /// the per-ordinal spread. Safe to call while workers are running.
    pub fn update_thresholds(&self, activation: usize, deactivation: usize) {
        for (ordinal, worker) in self.workers.iter().enumerate() {
            worker.thresholds().update(
                activation + ordinal * self.threshold_step,
                deactivation + ordinal * self.threshold_step,
            );
        }
    }

    /// The number of currently active workers, for diagnostics.
    pub fn active_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_active()).count()
    }

    pub(crate) fn request_stop_all(&self) {
        for worker in &self.workers {
            worker.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_of(n: usize, activation: usize, deactivation: usize, step: usize) -> WorkerChain {
        let mut options = Options::default();
        options.threads = n;
        options.activation_threshold = activation;
        options.deactivation_threshold = deactivation;
        options.threshold_step = step;
        WorkerChain::new(&options)
    }

    #[test]
    fn cascade_touches_only_the_immediate_successor() {
        let chain = chain_of(3, 10, 4, 0);
        chain.activate_successor_if_needed(0, 15);
        assert!(!chain.worker(0).is_active());
        assert!(chain.worker(1).is_active());
        assert!(!chain.worker(2).is_active());
    }

    #[test]
    fn cascade_needs_the_predecessors_watermark() {
        let chain = chain_of(3, 10, 4, 0);
        chain.activate_successor_if_needed(0, 9);
        assert!(!chain.worker(1).is_active());
    }

    #[test]
    fn cascade_from_the_tail_is_a_no_op() {
        let chain = chain_of(2, 10, 4, 0);
        chain.activate_successor_if_needed(1, 1000);
        assert_eq!(chain.active_workers(), 0);
    }

    #[test]
    fn ladder_spreads_thresholds_per_ordinal() {
        let chain = chain_of(3, 10, 4, 5);
        assert_eq!(chain.worker(0).thresholds().activation_threshold(), 10);
        assert_eq!(chain.worker(1).thresholds().activation_threshold(), 15);
        assert_eq!(chain.worker(2).thresholds().activation_threshold(), 20);

        chain.update_thresholds(20, 8);
        assert_eq!(chain.worker(2).thresholds().activation_threshold(), 30);
        assert_eq!(chain.worker(2).thresholds().deactivation_threshold(), 18);
    }
}
