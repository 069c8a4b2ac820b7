//! Reconnect delays for camera supervisors.
//!
//! A supervisor counts consecutive failed connections. Attempt `0` is the initial connect and
//! never waits; the first reconnect uses `delay(1)`. Delays saturate at [`MAX_BACKOFF`] and the
//! attempt counter is reset by the supervisor once a connection has produced a frame.
//!
//! ```rust
//! use std::time::Duration;
//! use alarmstream::backoff::{Jitter, ReconnectBackoff};
//!
//! let backoff = ReconnectBackoff::exponential(Duration::from_millis(500))
//!     .with_max(Duration::from_secs(8))
//!     .unwrap()
//!     .with_jitter(Jitter::None);
//! assert_eq!(backoff.delay(0), Duration::ZERO);
//! assert_eq!(backoff.delay(1), Duration::from_millis(500));
//! assert_eq!(backoff.delay(3), Duration::from_secs(2));
//! assert_eq!(backoff.delay(10), Duration::from_secs(8));
//! ```

use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Ceiling applied when a computation would overflow (1 hour; cameras are expected back).
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffError {
    ConstantDoesNotSupportMax,
    MaxMustBePositive,
    MaxLessThanBase { base: Duration, max: Duration },
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::ConstantDoesNotSupportMax => {
                write!(f, "with_max is only valid for exponential backoff")
            }
            BackoffError::MaxMustBePositive => write!(f, "max must be greater than zero"),
            BackoffError::MaxLessThanBase { base, max } => {
                write!(f, "max ({:?}) must be >= base ({:?})", max, base)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

/// Randomisation applied on top of the computed delay so that a site full of cameras
/// rebooting together does not reconnect in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Exact delay.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Uniform in `[delay/2, delay]`.
    Equal,
}

impl Jitter {
    pub fn apply(self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rand::rng())
    }

    /// Apply jitter with a caller-provided RNG (deterministic tests).
    pub fn apply_with_rng<R: Rng>(self, delay: Duration, rng: &mut R) -> Duration {
        let millis: u64 = delay.as_millis().try_into().unwrap_or(u64::MAX);
        if millis == 0 {
            return Duration::ZERO;
        }
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(rng.random_range(0..=millis)),
            Jitter::Equal => Duration::from_millis(rng.random_range(millis / 2..=millis)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    Constant { delay: Duration },
    Exponential { base: Duration, max: Option<Duration> },
}

/// Delay schedule between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectBackoff {
    schedule: Schedule,
    jitter: Jitter,
}

impl ReconnectBackoff {
    /// Wait the same delay before every reconnect.
    pub fn constant(delay: Duration) -> Self {
        Self { schedule: Schedule::Constant { delay }, jitter: Jitter::None }
    }

    /// Double the delay on each consecutive failure, starting at `base`.
    pub fn exponential(base: Duration) -> Self {
        Self { schedule: Schedule::Exponential { base, max: None }, jitter: Jitter::None }
    }

    /// Cap an exponential schedule. Errors on constant schedules, zero, or `max < base`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.schedule {
            Schedule::Exponential { base, max: existing } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            Schedule::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMax),
        }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Upper bound of the wait before reconnect `attempt`, before jitter.
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match self.schedule {
            Schedule::Constant { delay } => delay.min(MAX_BACKOFF),
            Schedule::Exponential { base, max } => {
                let exponent = attempt.saturating_sub(1).min(u32::MAX as usize) as u32;
                let multiplier = 2u128.saturating_pow(exponent);
                let nanos = base.as_nanos().saturating_mul(multiplier);
                let raw = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
                max.map(|m| raw.min(m)).unwrap_or(raw).min(MAX_BACKOFF)
            }
        }
    }

    /// The wait actually slept before reconnect `attempt`, jitter applied.
    pub fn jittered_delay(&self, attempt: usize) -> Duration {
        self.jitter.apply(self.delay(attempt))
    }
}

impl Default for ReconnectBackoff {
    /// Exponential from 1 s, capped at 30 s, equal jitter.
    fn default() -> Self {
        Self {
            schedule: Schedule::Exponential {
                base: Duration::from_secs(1),
                max: Some(Duration::from_secs(30)),
            },
            jitter: Jitter::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn constant_waits_the_same_after_the_first_attempt() {
        let backoff = ReconnectBackoff::constant(Duration::from_secs(5));
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_secs(5));
        assert_eq!(backoff.delay(500), Duration::from_secs(5));
    }

    #[test]
    fn exponential_doubles_until_capped() {
        let backoff = ReconnectBackoff::exponential(Duration::from_millis(250))
            .with_max(Duration::from_secs(2))
            .unwrap();
        assert_eq!(backoff.delay(1), Duration::from_millis(250));
        assert_eq!(backoff.delay(2), Duration::from_millis(500));
        assert_eq!(backoff.delay(3), Duration::from_secs(1));
        assert_eq!(backoff.delay(4), Duration::from_secs(2));
        assert_eq!(backoff.delay(40), Duration::from_secs(2));
    }

    #[test]
    fn uncapped_exponential_saturates() {
        let backoff = ReconnectBackoff::exponential(Duration::from_secs(1));
        assert_eq!(backoff.delay(1_000_000), MAX_BACKOFF);
        assert_eq!(backoff.delay(usize::MAX), MAX_BACKOFF);
    }

    #[test]
    fn with_max_validation() {
        assert_eq!(
            ReconnectBackoff::constant(Duration::from_secs(1)).with_max(Duration::from_secs(2)),
            Err(BackoffError::ConstantDoesNotSupportMax)
        );
        assert_eq!(
            ReconnectBackoff::exponential(Duration::from_secs(1)).with_max(Duration::ZERO),
            Err(BackoffError::MaxMustBePositive)
        );
        assert!(matches!(
            ReconnectBackoff::exponential(Duration::from_secs(10))
                .with_max(Duration::from_secs(5)),
            Err(BackoffError::MaxLessThanBase { .. })
        ));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let delay = Duration::from_millis(1000);
        for _ in 0..200 {
            let full = Jitter::Full.apply_with_rng(delay, &mut rng);
            assert!(full <= delay);
            let equal = Jitter::Equal.apply_with_rng(delay, &mut rng);
            assert!(equal >= Duration::from_millis(500) && equal <= delay);
        }
        assert_eq!(Jitter::None.apply_with_rng(delay, &mut rng), delay);
        assert_eq!(Jitter::Full.apply_with_rng(Duration::ZERO, &mut rng), Duration::ZERO);
    }

    #[test]
    fn default_is_capped_exponential_with_equal_jitter() {
        let backoff = ReconnectBackoff::default();
        assert_eq!(backoff.jitter(), Jitter::Equal);
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(20), Duration::from_secs(30));
        assert!(backoff.jittered_delay(20) >= Duration::from_secs(15));
    }
}
