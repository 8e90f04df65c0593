//! Configuration for the coordination subsystem. Options are consumed once,
//! when the [`GcCoordination`](crate::GcCoordination) context is built; they
//! are never re-read at runtime.

use std::default::Default;

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($(#[$outer:meta])*$name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])*$name: $type[$validator] = $default),*);
    ];
    ($($(#[$outer:meta])*$name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        /// The set of tunables consumed at construction time.
        pub struct Options {
            $($(#[$outer])*pub $name: $type),*
        }
        impl Options {
            /// Set an option from a string value. Returns true if the value
            /// parsed and passed the option's validator; otherwise the
            /// existing value is kept and a warning is logged.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling set_from_str()) to the right type
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        // Validate
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                        } else {
                            warn!("Unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("Unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => panic!("Invalid Options key: {}", s)
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Options {
                    $($name: $default),*
                };

                // If we have env vars that start with CONGC_ and match any option
                // (such as CONGC_THREADS), we set the option to its value (if it is
                // a valid value). Otherwise, use the default value.
                const PREFIX: &str = "CONGC_";
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                options
            }
        }
    ]
}

options! {
    /// Number of concurrent refinement worker threads.
    threads:                   usize [|v: &usize| *v > 0] = num_cpus::get(),
    /// Pending-buffer count at which the primary refinement worker activates.
    /// Successor workers add `threshold_step` per position in the chain.
    activation_threshold:      usize [always_valid] = 12,
    /// Pending-buffer count under which an active worker deactivates itself.
    deactivation_threshold:    usize [always_valid] = 4,
    /// Per-worker spread added to both thresholds for each position in the
    /// worker chain, so successors wake under progressively higher load.
    threshold_step:            usize [always_valid] = 4,
    /// Initial polling interval for the pacing controller, in milliseconds.
    /// Must be positive; a zero interval never grows back and degenerates
    /// into a busy poll.
    initial_interval_ms:       f64   [|v: &f64| *v > 0.0] = 300.0,
    /// Hard upper bound on the pacing interval, in milliseconds.
    max_interval_ms:           f64   [|v: &f64| *v > 0.0] = 10_000.0,
    /// Upper bound, in milliseconds, on how long the marking thread's paced
    /// delay may go without re-checking the safepoint and stop flags.
    safepoint_poll_ms:         u64   [|v: &u64| *v > 0] = 10,
}

impl Options {
    /// The activation/deactivation pair for the worker at `ordinal`, spread
    /// by `threshold_step` so the chain wakes up gradually as load grows.
    pub fn thresholds_for(&self, ordinal: usize) -> (usize, usize) {
        (
            self.activation_threshold + ordinal * self.threshold_step,
            self.deactivation_threshold + ordinal * self.threshold_step,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = Options::default();
        assert!(options.threads > 0);
        assert!(options.activation_threshold >= options.deactivation_threshold);
        assert!(options.max_interval_ms > 0.0);
    }

    #[test]
    fn set_from_str_parses_and_validates() {
        let mut options = Options::default();
        assert!(options.set_from_str("activation_threshold", "64"));
        assert_eq!(options.activation_threshold, 64);
        // Zero threads fails validation and keeps the old value.
        let old = options.threads;
        assert!(!options.set_from_str("threads", "0"));
        assert_eq!(options.threads, old);
        // Garbage fails to parse.
        assert!(!options.set_from_str("max_interval_ms", "fast"));
        // A zero pacing interval fails validation.
        assert!(!options.set_from_str("initial_interval_ms", "0"));
        assert_eq!(options.initial_interval_ms, 300.0);
    }

    #[test]
    fn per_worker_threshold_ladder() {
        let mut options = Options::default();
        options.activation_threshold = 10;
        options.deactivation_threshold = 2;
        options.threshold_step = 4;
        assert_eq!(options.thresholds_for(0), (10, 2));
        assert_eq!(options.thresholds_for(2), (18, 10));
    }

    #[test]
    #[should_panic]
    fn unknown_key_is_a_programming_error() {
        let mut options = Options::default();
        options.set_from_str("no_such_option", "1");
    }
}
