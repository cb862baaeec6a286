#![forbid(unsafe_code)]

//! Time sources for the cooperative scheduler.
//!
//! Every timestamp in pdfdesk is a [`Duration`] measured from the origin of a
//! [`Clock`]. Two sources exist:
//!
//! - [`MonotonicClock`] reads `web_time::Instant`, so it works on native
//!   targets and in the browser alike.
//! - [`ManualClock`] only moves when told to. Tests and replay tooling use
//!   it to drive timers deterministically without sleeping.
//!
//! # Example
//!
//! ```
//! use pdfdesk_core::clock::Clock;
//! use std::time::Duration;
//!
//! let clock = Clock::manual();
//! let handle = clock.as_manual().unwrap().clone();
//! handle.advance(Duration::from_millis(150));
//! assert_eq!(clock.now(), Duration::from_millis(150));
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use web_time::Instant;

/// A time source. Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub enum Clock {
    /// Wall-clock monotonic time.
    Monotonic(MonotonicClock),
    /// Explicitly advanced virtual time.
    Manual(ManualClock),
}

impl Clock {
    /// A clock backed by the platform's monotonic timer.
    #[must_use]
    pub fn monotonic() -> Self {
        Self::Monotonic(MonotonicClock::new())
    }

    /// A virtual clock starting at zero.
    #[must_use]
    pub fn manual() -> Self {
        Self::Manual(ManualClock::new())
    }

    /// Time elapsed since the clock origin.
    #[must_use]
    pub fn now(&self) -> Duration {
        match self {
            Self::Monotonic(clock) => clock.now(),
            Self::Manual(clock) => clock.now(),
        }
    }

    /// The manual handle, if this clock is virtual.
    #[must_use]
    pub fn as_manual(&self) -> Option<&ManualClock> {
        match self {
            Self::Manual(clock) => Some(clock),
            Self::Monotonic(_) => None,
        }
    }

    /// Whether this clock only moves when advanced explicitly.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual(_))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::monotonic()
    }
}

/// Monotonic time measured from the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Virtual time shared between every clone of the handle.
///
/// # Invariants
///
/// 1. Time starts at zero.
/// 2. Time never moves backwards: [`set`](Self::set) to an earlier instant
///    is ignored.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get().saturating_add(by));
    }

    /// Jump to `at`. Returns `false` (and leaves time unchanged) if `at` lies
    /// in the past.
    pub fn set(&self, at: Duration) -> bool {
        if at < self.now.get() {
            return false;
        }
        self.now.set(at);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_starts_at_zero() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn manual_clock_advance_accumulates() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_millis(100));
        clock.advance(Duration::from_millis(50));
        assert_eq!(clock.now(), Duration::from_millis(150));
    }

    #[test]
    fn manual_clock_never_moves_backwards() {
        let clock = ManualClock::new();
        assert!(clock.set(Duration::from_millis(300)));
        assert!(!clock.set(Duration::from_millis(200)));
        assert_eq!(clock.now(), Duration::from_millis(300));
    }

    #[test]
    fn manual_clones_share_time() {
        let clock = Clock::manual();
        let handle = clock.as_manual().unwrap().clone();
        handle.advance(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));
        assert!(clock.is_manual());
    }

    #[test]
    fn monotonic_clock_is_not_manual() {
        let clock = Clock::monotonic();
        assert!(clock.as_manual().is_none());
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
