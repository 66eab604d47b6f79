//! Monotonic high-resolution time and bounded-wait timeouts.
//!
//! Ticks come from `minstant`, which reads the CPU cycle counter and
//! calibrates it against the operating-system clock on first use. Wall-clock
//! timestamps are deliberately absent here; they belong to the logger sinks,
//! never to the real-time path.

mod timeout;

pub use timeout::Timeout;

use once_cell::sync::Lazy;

static ORIGIN: Lazy<minstant::Instant> = Lazy::new(minstant::Instant::now);

/// Number of ticks in one second.
pub const TICKS_PER_SECOND: u64 = 1_000_000_000;

/// Forces tick calibration. Called once at startup so the first measured
/// cycle does not pay the calibration cost.
pub fn calibrate() {
    Lazy::force(&ORIGIN);
}

/// The current value of the monotonic tick counter.
pub fn ticks() -> u64 {
    minstant::Instant::now().duration_since(*ORIGIN).as_nanos() as u64
}

/// Resolution of [`ticks`].
pub fn ticks_per_second() -> u64 {
    TICKS_PER_SECOND
}

/// Converts a tick interval to seconds. Saturates at zero when `stop`
/// precedes `start`.
pub fn ticks_to_secs(stop: u64, start: u64) -> f64 {
    stop.saturating_sub(start) as f64 / TICKS_PER_SECOND as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn ticks_are_monotonic() {
        let a = ticks();
        let b = ticks();
        assert!(b >= a);
    }

    #[test]
    fn interval_roughly_matches_sleep() {
        let start = ticks();
        thread::sleep(Duration::from_millis(20));
        let stop = ticks();
        let secs = ticks_to_secs(stop, start);
        assert!(secs >= 0.015, "measured {secs}s");
        assert!(secs < 1.0, "measured {secs}s");
    }

    #[test]
    fn reversed_interval_saturates() {
        assert_eq!(ticks_to_secs(1, 2), 0.0);
    }
}
