//! Session configuration, validation, and error types.
//!
//! [`SessionConfig`] is the builder-input for both session modes.
//! [`validate()`](SessionConfig::validate) checks structural invariants
//! before any ring or arena is allocated.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use weir_arena::{ArenaConfig, ArenaError};
use weir_registry::ManifestError;

// ── RetryConfig ───────────────────────────────────────────────────

/// Bounded exponential backoff for pushing results into a full ring.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total push attempts before the result is dropped. Default: 8.
    pub max_attempts: u32,
    /// Sleep after the first failed attempt. Default: 50 µs.
    pub initial_backoff: Duration,
    /// Upper bound on any single sleep. Default: 5 ms.
    pub max_backoff: Duration,
    /// Factor applied to the sleep after each failed attempt. Default: 2.0.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_micros(50),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// The sleep that follows `current`.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let nanos = current.as_nanos() as f64 * self.multiplier;
        Duration::from_nanos(nanos as u64).min(self.max_backoff)
    }

    /// Upper bound on the total time spent retrying one result.
    pub fn worst_case(&self) -> Duration {
        let mut total = Duration::ZERO;
        let mut delay = self.initial_backoff;
        for _ in 1..self.max_attempts {
            total += delay;
            delay = self.next_backoff(delay);
        }
        total
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry {
                reason: "max_attempts must be at least 1".into(),
            });
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::InvalidRetry {
                reason: format!("multiplier must be finite and >= 1.0, got {}", self.multiplier),
            });
        }
        if self.initial_backoff > self.max_backoff {
            return Err(ConfigError::InvalidRetry {
                reason: format!(
                    "initial_backoff {:?} exceeds max_backoff {:?}",
                    self.initial_backoff, self.max_backoff
                ),
            });
        }
        Ok(())
    }
}

// ── IdleConfig ────────────────────────────────────────────────────

/// How a waiting thread backs off while nothing is ready.
///
/// The waiter spins, then yields, then parks with a timeout. Used by the
/// realtime dispatcher thread and by `wait`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdleConfig {
    /// Busy-wait rounds before yielding. Default: 64.
    pub spin_iterations: u32,
    /// `yield_now` rounds before parking. Default: 16.
    pub yield_iterations: u32,
    /// Longest single park. Default: 1 ms.
    pub park_timeout: Duration,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            spin_iterations: 64,
            yield_iterations: 16,
            park_timeout: Duration::from_millis(1),
        }
    }
}

// ── ConfigError ───────────────────────────────────────────────────

/// Errors detected while building a session.
#[derive(Debug)]
pub enum ConfigError {
    /// Arena configuration is invalid.
    Arena(ArenaError),
    /// The registry could not be built from the manifest.
    Registry(ManifestError),
    /// A ring capacity is not a power of two of at least 2.
    RingCapacity {
        /// Which ring.
        ring: &'static str,
        /// The configured capacity.
        configured: usize,
    },
    /// `RetryConfig` invariant violated.
    InvalidRetry {
        /// Which invariant was violated.
        reason: String,
    },
    /// `result_retention` is zero.
    ZeroRetention,
    /// The dispatcher thread could not be spawned.
    ThreadSpawnFailed {
        /// Underlying error text.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arena(e) => write!(f, "arena: {e}"),
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::RingCapacity { ring, configured } => write!(
                f,
                "{ring} ring capacity {configured} must be a power of two >= 2"
            ),
            Self::InvalidRetry { reason } => write!(f, "invalid retry config: {reason}"),
            Self::ZeroRetention => write!(f, "result_retention must be non-zero"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            Self::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for ConfigError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

impl From<ManifestError> for ConfigError {
    fn from(e: ManifestError) -> Self {
        Self::Registry(e)
    }
}

// ── SessionConfig ─────────────────────────────────────────────────

/// Everything needed to start a session except the registry.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Arena size and alignment.
    pub arena: ArenaConfig,
    /// Command ring slots. Power of two, at least 2. Default: 64.
    pub command_capacity: usize,
    /// Result ring slots. Power of two, at least 2. Default: 64.
    pub result_capacity: usize,
    /// Result push retry policy.
    pub retry: RetryConfig,
    /// How long an unclaimed result is kept before it is discarded.
    /// Default: 60 s.
    pub result_retention: Duration,
    /// Idle policy for the dispatcher thread and `wait`.
    pub idle: IdleConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            arena: ArenaConfig::default(),
            command_capacity: 64,
            result_capacity: 64,
            retry: RetryConfig::default(),
            result_retention: Duration::from_secs(60),
            idle: IdleConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Default config with an arena of `capacity` bytes.
    pub fn with_arena_capacity(capacity: usize) -> Self {
        Self {
            arena: ArenaConfig::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.arena.validate()?;
        for (ring, configured) in [
            ("command", self.command_capacity),
            ("result", self.result_capacity),
        ] {
            if configured < 2 || !configured.is_power_of_two() {
                return Err(ConfigError::RingCapacity { ring, configured });
            }
        }
        self.retry.validate()?;
        if self.result_retention.is_zero() {
            return Err(ConfigError::ZeroRetention);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SessionConfig::default().validate().unwrap();
    }

    #[test]
    fn ring_capacity_must_be_power_of_two() {
        let config = SessionConfig {
            command_capacity: 48,
            ..SessionConfig::default()
        };
        match config.validate() {
            Err(ConfigError::RingCapacity { ring, configured }) => {
                assert_eq!(ring, "command");
                assert_eq!(configured, 48);
            }
            other => panic!("expected RingCapacity, got {other:?}"),
        }

        let config = SessionConfig {
            result_capacity: 1,
            ..SessionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RingCapacity { ring: "result", .. })
        ));
    }

    #[test]
    fn arena_errors_propagate() {
        let config = SessionConfig::with_arena_capacity(1001);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Arena(ArenaError::InvalidConfig { .. })));
        assert!(err.source().is_some());
    }

    #[test]
    fn retry_rejects_zero_attempts_and_shrinking_multiplier() {
        let mut config = SessionConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry { .. })));

        let mut config = SessionConfig::default();
        config.retry.multiplier = 0.5;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry { .. })));

        let mut config = SessionConfig::default();
        config.retry.multiplier = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry { .. })));
    }

    #[test]
    fn zero_retention_is_rejected() {
        let config = SessionConfig {
            result_retention: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroRetention)));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let retry = RetryConfig::default();
        let mut delay = retry.initial_backoff;
        let mut seen = vec![delay];
        for _ in 0..10 {
            delay = retry.next_backoff(delay);
            seen.push(delay);
        }
        assert_eq!(seen[1], Duration::from_micros(100));
        assert_eq!(seen[2], Duration::from_micros(200));
        assert_eq!(*seen.last().unwrap(), retry.max_backoff);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn worst_case_sums_the_sleeps() {
        let retry = RetryConfig {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(3),
            multiplier: 2.0,
        };
        // 1 + 2 + 3 ms: no sleep after the last attempt.
        assert_eq!(retry.worst_case(), Duration::from_millis(6));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn backoff_is_monotone_and_capped(
                initial_us in 1u64..1_000,
                extra_us in 0u64..10_000,
                multiplier in 1.0f64..8.0,
                attempts in 1u32..32,
            ) {
                let retry = RetryConfig {
                    max_attempts: attempts,
                    initial_backoff: Duration::from_micros(initial_us),
                    max_backoff: Duration::from_micros(initial_us + extra_us),
                    multiplier,
                };
                prop_assert!(retry.validate().is_ok());
                let mut delay = retry.initial_backoff;
                for _ in 0..attempts {
                    let next = retry.next_backoff(delay);
                    prop_assert!(next >= delay);
                    prop_assert!(next <= retry.max_backoff);
                    delay = next;
                }
                let bound = retry.max_backoff * attempts.saturating_sub(1);
                prop_assert!(retry.worst_case() <= bound);
            }
        }
    }
}
