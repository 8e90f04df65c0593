//! This module contains `WorkerMonitor`, the synchronization point a
//! concurrent worker blocks on. Its purposes include:
//!
//! -   letting a worker wait, cooperatively and without busy-spinning, until
//!     its state machine says there is something to do,
//! -   letting other threads (the collector policy, a predecessor in the
//!     worker chain) change that state and wake the worker, and
//! -   delivering stop requests, which take priority over any state.
//!
//! Every wait has an explicit predicate over the state; there are no bare
//! timed sleeps, so a wake-up between the predicate check and the block
//! cannot be missed.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Returned from a wait when the worker should exit its loop and let its
/// thread terminate.
#[derive(Debug)]
pub(crate) struct WorkerShouldExit;

/// A monitor guarding one worker's state machine.
///
/// The state lives inside the mutex: every transition happens under the lock
/// and is followed by a notification, so a worker blocked on a predicate over
/// the state always observes the transition that made its predicate true.
pub(crate) struct WorkerMonitor<S> {
    sync: Mutex<WorkerMonitorSync<S>>,
    /// Workers wait on this when idle. Notified on every state transition and
    /// on stop requests.
    worker_has_anything_to_do: Condvar,
}

struct WorkerMonitorSync<S> {
    state: S,
    stop_requested: bool,
}

impl<S: Copy> WorkerMonitor<S> {
    pub fn new(initial: S) -> Self {
        Self {
            sync: Mutex::new(WorkerMonitorSync {
                state: initial,
                stop_requested: false,
            }),
            worker_has_anything_to_do: Default::default(),
        }
    }

    /// Read the current state.
    pub fn state(&self) -> S {
        self.sync.lock().unwrap().state
    }

    /// Run a transition under the lock and wake any waiter. The closure's
    /// return value is passed through.
    pub fn transition<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut sync = self.sync.lock().unwrap();
        let result = f(&mut sync.state);
        drop(sync);
        // Waiters re-check their predicate, so notifying unconditionally is
        // harmless and keeps transitions free of wake-up policy.
        self.worker_has_anything_to_do.notify_all();
        result
    }

    /// Block until `ready(state)` holds. A stop request wins over any state
    /// and returns `Err(WorkerShouldExit)`.
    pub fn wait_for(&self, ready: impl Fn(&S) -> bool) -> Result<(), WorkerShouldExit> {
        let mut sync = self.sync.lock().unwrap();
        loop {
            if sync.stop_requested {
                return Err(WorkerShouldExit);
            }
            if ready(&sync.state) {
                return Ok(());
            }
            sync = self.worker_has_anything_to_do.wait(sync).unwrap();
        }
    }

    /// Like [`wait_for`](Self::wait_for), but gives up after `timeout`.
    /// Returns `Ok(true)` if the predicate held, `Ok(false)` on timeout.
    pub fn wait_for_timeout(
        &self,
        ready: impl Fn(&S) -> bool,
        timeout: Duration,
    ) -> Result<bool, WorkerShouldExit> {
        let deadline = Instant::now() + timeout;
        let mut sync = self.sync.lock().unwrap();
        loop {
            if sync.stop_requested {
                return Err(WorkerShouldExit);
            }
            if ready(&sync.state) {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let (guard, _timeout_result) = self
                .worker_has_anything_to_do
                .wait_timeout(sync, deadline - now)
                .unwrap();
            sync = guard;
        }
    }

    /// Ask the worker to exit. Observed by the worker at the top of its next
    /// loop iteration; an in-flight unit of work always completes first.
    pub fn request_stop(&self) {
        let mut sync = self.sync.lock().unwrap();
        sync.stop_requested = true;
        drop(sync);
        self.worker_has_anything_to_do.notify_all();
    }

    pub fn stop_requested(&self) -> bool {
        self.sync.lock().unwrap().stop_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    enum TestState {
        Sleeping,
        Poked,
    }

    #[test]
    fn wait_observes_transition() {
        let monitor = Arc::new(WorkerMonitor::new(TestState::Sleeping));
        let woken = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            let monitor2 = monitor.clone();
            let woken = &woken;
            scope.spawn(move || {
                monitor2
                    .wait_for(|s| *s == TestState::Poked)
                    .expect("should not be stopped");
                woken.fetch_add(1, Ordering::SeqCst);
            });
            monitor.transition(|s| *s = TestState::Poked);
        });

        assert_eq!(woken.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_wins_over_state() {
        let monitor = Arc::new(WorkerMonitor::new(TestState::Sleeping));

        std::thread::scope(|scope| {
            let monitor2 = monitor.clone();
            scope.spawn(move || {
                // The predicate never becomes true; only the stop request can
                // end this wait.
                assert!(monitor2.wait_for(|s| *s == TestState::Poked).is_err());
            });
            monitor.request_stop();
        });

        assert!(monitor.stop_requested());
    }

    #[test]
    fn timed_wait_reports_timeout() {
        let monitor = WorkerMonitor::new(TestState::Sleeping);
        let result = monitor
            .wait_for_timeout(|s| *s == TestState::Poked, Duration::from_millis(10))
            .unwrap();
        assert!(!result);
        assert_eq!(monitor.state(), TestState::Sleeping);
    }
}
