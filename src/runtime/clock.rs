//! Millisecond clock sources.

use std::time::Instant;

/// A monotonic millisecond clock.
///
/// Readings must never decrease. Sleeping tasks compare their wake time
/// against it; a reading of `0` is valid and means "no time has passed".
pub trait Clock {
    /// Milliseconds since some fixed origin.
    fn now_ms(&self) -> u64;
}

/// Wall-time clock counting milliseconds since it was constructed.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl<F> Clock for F
where
    F: Fn() -> u64,
{
    #[inline]
    fn now_ms(&self) -> u64 {
        self()
    }
}
