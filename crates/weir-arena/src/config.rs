//! Arena configuration parameters.

use crate::error::ArenaError;

/// Configuration for the session arena.
///
/// Validated by [`Arena::new`](crate::Arena::new); immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Usable bytes. Must be a non-zero multiple of `alignment`.
    ///
    /// Default: 65536.
    pub capacity: usize,

    /// Allocation granule and offset alignment in bytes.
    ///
    /// Every allocation starts on a multiple of this value and reserves a
    /// multiple of it. Must be a power of two and at least 8, so every
    /// [`ElementKind`](weir_core::ElementKind) can be viewed in place.
    ///
    /// Default: 8.
    pub alignment: usize,
}

impl ArenaConfig {
    /// Default capacity in bytes.
    pub const DEFAULT_CAPACITY: usize = 64 * 1024;

    /// Default alignment in bytes.
    pub const DEFAULT_ALIGNMENT: usize = 8;

    /// Config with the given capacity and default alignment.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            alignment: Self::DEFAULT_ALIGNMENT,
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if !self.alignment.is_power_of_two() || self.alignment < Self::DEFAULT_ALIGNMENT {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "alignment must be a power of two >= 8, got {}",
                    self.alignment
                ),
            });
        }
        if self.capacity == 0 || self.capacity % self.alignment != 0 {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "capacity must be a non-zero multiple of {}, got {}",
                    self.alignment, self.capacity
                ),
            });
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        ArenaConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_unaligned_capacity() {
        let err = ArenaConfig::with_capacity(1020).validate().unwrap_err();
        assert!(matches!(err, ArenaError::InvalidConfig { .. }));
    }

    #[test]
    fn rejects_small_or_odd_alignment() {
        for alignment in [0, 4, 12] {
            let config = ArenaConfig {
                capacity: 1024,
                alignment,
            };
            assert!(config.validate().is_err(), "alignment {alignment}");
        }
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(ArenaConfig::with_capacity(0).validate().is_err());
    }
}
