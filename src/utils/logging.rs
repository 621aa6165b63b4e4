//! Verbosity-gated diagnostics on top of the `log` facade.
//!
//! Usage:
//! ```ignore
//! use crate::verbose;
//!
//! verbose!(1, "Player count: {}", count);
//! ```
//!
//! A message is emitted (at info level) only when its level is at or below
//! the process-wide verbosity configured through [`init`].

use std::sync::atomic::{AtomicU8, Ordering};

static VERBOSITY: AtomicU8 = AtomicU8::new(1);

/// Installs the `env_logger` backend and records the verbosity threshold.
///
/// `RUST_LOG` still applies on top of the default `info` filter. Calling this
/// more than once only updates the verbosity.
pub fn init(verbosity: u8) {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
    set_verbosity(verbosity);
}

pub fn set_verbosity(level: u8) {
    VERBOSITY.store(level, Ordering::Relaxed);
}

pub fn enabled(level: u8) -> bool {
    level <= VERBOSITY.load(Ordering::Relaxed)
}

/// Macro for verbose diagnostics.
///
/// The first argument is the verbosity level the message belongs to; the rest
/// is forwarded to `log::info!` unchanged.
#[macro_export]
macro_rules! verbose {
    ($level:expr, $($arg:tt)*) => {
        if $crate::utils::logging::enabled($level) {
            log::info!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_at_or_below_threshold_are_enabled() {
        set_verbosity(2);
        assert!(enabled(1));
        assert!(enabled(2));
        assert!(!enabled(3));
        set_verbosity(1);
    }
}
