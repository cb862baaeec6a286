#![forbid(unsafe_code)]

//! Validated timer delays and throttle policies.
//!
//! A [`Delay`] is always finite and non-negative. Building one from a
//! [`Duration`] cannot fail; building one from raw milliseconds (as read from
//! configuration files or environment variables) rejects negative, NaN, and
//! infinite input with [`TimingError::InvalidArgument`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TimingError;

/// A non-negative delay before a scheduled callback fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Delay(Duration);

impl Delay {
    pub const ZERO: Self = Self(Duration::ZERO);

    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    /// Parse a fractional millisecond count.
    pub fn try_from_millis_f64(ms: f64) -> Result<Self, TimingError> {
        if !ms.is_finite() || ms < 0.0 {
            return Err(TimingError::negative_delay(ms));
        }
        // `abs` folds -0.0 into 0.0.
        Duration::try_from_secs_f64(ms.abs() / 1000.0)
            .map(Self)
            .map_err(|_| TimingError::negative_delay(ms))
    }

    #[must_use]
    pub const fn as_duration(self) -> Duration {
        self.0
    }

    #[must_use]
    pub fn as_millis_f64(self) -> f64 {
        self.0.as_secs_f64() * 1000.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.as_millis_f64())
    }
}

impl From<Duration> for Delay {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl From<Delay> for Duration {
    fn from(delay: Delay) -> Self {
        delay.0
    }
}

/// Whole milliseconds.
impl From<u64> for Delay {
    fn from(ms: u64) -> Self {
        Self::from_millis(ms)
    }
}

impl TryFrom<f64> for Delay {
    type Error = TimingError;

    fn try_from(ms: f64) -> Result<Self, Self::Error> {
        Self::try_from_millis_f64(ms)
    }
}

impl TryFrom<i64> for Delay {
    type Error = TimingError;

    fn try_from(ms: i64) -> Result<Self, Self::Error> {
        u64::try_from(ms)
            .map(Self::from_millis)
            .map_err(|_| TimingError::negative_delay(ms as f64))
    }
}

/// Bare integer literals default to `i32`.
impl TryFrom<i32> for Delay {
    type Error = TimingError;

    fn try_from(ms: i32) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(ms))
    }
}

/// What a throttled wrapper does with input that arrives while its window
/// is still open.
///
/// Under both policies, input that finds no open window is delivered
/// immediately and opens a window of the configured delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThrottlePolicy {
    /// Discard in-window input. Nothing fires when the window closes.
    DropLate,
    /// Keep the latest in-window input and deliver it once the window
    /// closes. The trailing delivery opens a new window.
    DeferTrailing,
}

impl fmt::Display for ThrottlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropLate => f.write_str("drop-late"),
            Self::DeferTrailing => f.write_str("defer-trailing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_duration_is_exact() {
        let delay = Delay::from(Duration::from_millis(300));
        assert_eq!(delay.as_duration(), Duration::from_millis(300));
    }

    #[test]
    fn fractional_millis_are_kept() {
        let delay = Delay::try_from(12.5).unwrap();
        assert!((delay.as_millis_f64() - 12.5).abs() < 1e-6);
        let whole = Delay::try_from(250.0).unwrap();
        assert_eq!(whole.as_duration(), Duration::from_millis(250));
    }

    #[test]
    fn zero_is_valid() {
        assert!(Delay::try_from(0.0).unwrap().is_zero());
        assert!(Delay::try_from(-0.0).unwrap().is_zero());
        assert!(Delay::try_from(0_i64).unwrap().is_zero());
    }

    #[test]
    fn negative_is_rejected() {
        assert!(matches!(
            Delay::try_from(-1.0),
            Err(TimingError::InvalidArgument { what: "delay", .. })
        ));
        assert!(matches!(
            Delay::try_from(-300_i64),
            Err(TimingError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn plain_integer_literals_convert() {
        fn delay_of<D>(d: D) -> Result<Delay, TimingError>
        where
            D: TryInto<Delay>,
            TimingError: From<D::Error>,
        {
            Ok(d.try_into()?)
        }

        assert_eq!(delay_of(300).unwrap(), Delay::from_millis(300));
        assert_eq!(delay_of(300u64).unwrap(), Delay::from_millis(300));
        assert!(delay_of(-1).is_err());
        assert_eq!(Delay::from(45u64).as_duration(), Duration::from_millis(45));
    }

    #[test]
    fn non_finite_is_rejected() {
        assert!(Delay::try_from(f64::NAN).is_err());
        assert!(Delay::try_from(f64::INFINITY).is_err());
        assert!(Delay::try_from(f64::MAX).is_err());
    }

    #[test]
    fn display_in_millis() {
        assert_eq!(Delay::from_millis(250).to_string(), "250ms");
        assert_eq!(ThrottlePolicy::DeferTrailing.to_string(), "defer-trailing");
    }

    #[test]
    fn policy_serde_is_kebab_case() {
        let json = serde_json::to_string(&ThrottlePolicy::DropLate).unwrap();
        assert_eq!(json, "\"drop-late\"");
        let back: ThrottlePolicy = serde_json::from_str("\"defer-trailing\"").unwrap();
        assert_eq!(back, ThrottlePolicy::DeferTrailing);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn whole_millis_within_a_nanosecond(ms in 0u64..86_400_000) {
                let parsed = Delay::try_from_millis_f64(ms as f64).unwrap().as_duration();
                let exact = Duration::from_millis(ms);
                let diff = parsed.abs_diff(exact);
                prop_assert!(diff <= Duration::from_nanos(1), "{ms}ms off by {diff:?}");
            }

            #[test]
            fn negative_millis_always_rejected(ms in -1.0e12f64..-1.0e-9) {
                prop_assert!(Delay::try_from(ms).is_err());
            }

            #[test]
            fn i64_matches_u64_for_non_negative(ms in 0i64..i64::MAX) {
                prop_assert_eq!(Delay::try_from(ms).unwrap(), Delay::from_millis(ms as u64));
            }
        }
    }
}
