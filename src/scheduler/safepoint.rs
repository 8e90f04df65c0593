//! The safepoint/yield collaborator.
//!
//! A safepoint pauses every mutator thread so the collector can inspect or
//! mutate shared heap state. Concurrent workers are not mutators, but they
//! touch the same structures, so a worker must suspend itself promptly when a
//! safepoint is requested: delaying a safepoint blocks every other thread in
//! the process. Workers keep their units of work short and poll this trait at
//! the top of each unit.

/// Implemented by the VM's safepoint mechanism.
pub trait SafepointSync: Send + Sync + 'static {
    /// Whether a VM-wide safepoint has been requested and this thread should
    /// reach its yield point.
    fn should_yield(&self) -> bool;

    /// Suspend the calling thread until the safepoint completes. Only called
    /// after `should_yield` returned true. This is a hard latency
    /// requirement, not best-effort.
    fn yield_now(&self);
}

/// For embedders without a safepoint protocol, and for tests.
pub struct NoSafepoint;

impl SafepointSync for NoSafepoint {
    fn should_yield(&self) -> bool {
        false
    }

    fn yield_now(&self) {}
}
