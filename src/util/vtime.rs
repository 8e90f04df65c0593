//! Virtual time: CPU time consumed by the calling thread, as opposed to wall
//! clock time. Pacing decisions use virtual time so that a loaded machine does
//! not look like a slow collector.

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        /// CPU time consumed by the calling thread, in milliseconds.
        pub fn elapsed_vtime_ms() -> f64 {
            let mut ts = libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            };
            let ret = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
            debug_assert_eq!(ret, 0, "clock_gettime(CLOCK_THREAD_CPUTIME_ID) failed");
            ts.tv_sec as f64 * 1e3 + ts.tv_nsec as f64 / 1e6
        }
    } else {
        use std::sync::OnceLock;
        use std::time::Instant;

        static EPOCH: OnceLock<Instant> = OnceLock::new();

        /// Wall-clock fallback for platforms without a per-thread CPU clock.
        /// Monotonic per thread, which is all the pacing logic relies on.
        pub fn elapsed_vtime_ms() -> f64 {
            let epoch = EPOCH.get_or_init(Instant::now);
            epoch.elapsed().as_secs_f64() * 1e3
        }
    }
}
