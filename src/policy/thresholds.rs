//! Activation and deactivation watermarks for a refinement worker.
//!
//! A worker wakes when the pending-buffer count reaches its activation
//! threshold and puts itself back to sleep when the count falls under its
//! deactivation threshold. The pair is retuned infrequently by the collector
//! policy while the worker keeps reading it, so both words are packed into a
//! single atomic: a reader can observe a stale pair, but never a torn one. A
//! torn pair would not corrupt anything, but an inverted pair causes
//! activate/deactivate thrashing.

use std::sync::atomic::{AtomicU64, Ordering};

/// An activation/deactivation threshold pair, updatable concurrently with
/// readers.
pub struct ActivationThresholds {
    // activation in the high 32 bits, deactivation in the low 32 bits
    packed: AtomicU64,
}

fn pack(activation: usize, deactivation: usize) -> u64 {
    assert!(
        activation <= u32::MAX as usize && deactivation <= u32::MAX as usize,
        "threshold out of range: {}/{}",
        activation,
        deactivation
    );
    ((activation as u64) << 32) | deactivation as u64
}

impl ActivationThresholds {
    pub fn new(activation: usize, deactivation: usize) -> Self {
        if deactivation > activation {
            warn!(
                "deactivation threshold {} above activation threshold {}; \
                 expect activation thrashing",
                deactivation, activation
            );
        }
        Self {
            packed: AtomicU64::new(pack(activation, deactivation)),
        }
    }

    /// Whether an inactive worker should wake for this many pending buffers.
    pub fn should_activate(&self, pending: usize) -> bool {
        pending >= self.activation_threshold()
    }

    /// Whether an active worker should put itself back to sleep.
    pub fn should_deactivate(&self, pending: usize) -> bool {
        pending < self.deactivation_threshold()
    }

    /// Replace both thresholds. Safe to call while the owning worker reads
    /// them; the worker observes either the old pair or the new pair. An
    /// inverted pair is accepted (the tuning logic owns that judgment) but
    /// logged, since it causes oscillation.
    pub fn update(&self, activation: usize, deactivation: usize) {
        if deactivation > activation {
            warn!(
                "updating thresholds to deactivation {} above activation {}; \
                 expect activation thrashing",
                deactivation, activation
            );
        }
        self.packed
            .store(pack(activation, deactivation), Ordering::Release);
    }

    pub fn activation_threshold(&self) -> usize {
        (self.packed.load(Ordering::Acquire) >> 32) as usize
    }

    pub fn deactivation_threshold(&self) -> usize {
        (self.packed.load(Ordering::Acquire) & u32::MAX as u64) as usize
    }

    #[cfg(test)]
    fn load_pair(&self) -> (usize, usize) {
        let packed = self.packed.load(Ordering::Acquire);
        ((packed >> 32) as usize, (packed & u32::MAX as u64) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn watermark_semantics() {
        let thresholds = ActivationThresholds::new(10, 4);
        assert!(!thresholds.should_activate(9));
        assert!(thresholds.should_activate(10));
        assert!(thresholds.should_deactivate(3));
        assert!(!thresholds.should_deactivate(4));
    }

    #[test]
    fn update_replaces_both() {
        let thresholds = ActivationThresholds::new(10, 4);
        thresholds.update(100, 40);
        assert_eq!(thresholds.activation_threshold(), 100);
        assert_eq!(thresholds.deactivation_threshold(), 40);
    }

    /// Concurrent readers never see a pair that was not written as a pair.
    #[test]
    fn no_torn_pairs_under_concurrent_update() {
        let thresholds = ActivationThresholds::new(10, 5);
        let stop = AtomicBool::new(false);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..100_000usize {
                    // Every written pair keeps activation == 2 * deactivation.
                    thresholds.update(2 * i, i);
                }
                stop.store(true, Ordering::Release);
            });
            scope.spawn(|| {
                while !stop.load(Ordering::Acquire) {
                    let (activation, deactivation) = thresholds.load_pair();
                    assert_eq!(activation, 2 * deactivation);
                }
            });
        });
    }
}
