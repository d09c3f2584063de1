//! Error taxonomy shared across the trust boundary.
//!
//! [`ErrorCode`] is the wire-level vocabulary carried in result records.
//! Each crate keeps its own richer error enum and maps onto these codes
//! through a `code()` method.

use std::error::Error;
use std::fmt;

/// Failure code carried by a result record.
///
/// The discriminant is the `u8` written to the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    /// The arena has no free range large enough.
    OutOfSpace = 1,
    /// Release of a range that is not currently allocated.
    InvalidSlot = 2,
    /// A slot lies outside `[0, capacity)` or is misaligned for its kind.
    BoundsViolation = 3,
    /// The op id has no registry entry.
    UnknownOperation = 4,
    /// Input count, rank or extent disagrees with the contract.
    ShapeMismatch = 5,
    /// Element kind disagrees with the contract.
    TypeMismatch = 6,
    /// A ring rejected a push after the retry bound was exhausted.
    ChannelSaturated = 7,
    /// No result arrived before the caller's deadline.
    TimedOut = 8,
    /// The routine itself reported a failure.
    ExecutionFailed = 9,
    /// The output slot overlaps one of the input slots.
    Aliased = 10,
    /// The dispatcher has halted and accepts no further work.
    Halted = 11,
}

impl ErrorCode {
    /// Wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a wire value. Returns `None` for unknown codes.
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::OutOfSpace,
            2 => Self::InvalidSlot,
            3 => Self::BoundsViolation,
            4 => Self::UnknownOperation,
            5 => Self::ShapeMismatch,
            6 => Self::TypeMismatch,
            7 => Self::ChannelSaturated,
            8 => Self::TimedOut,
            9 => Self::ExecutionFailed,
            10 => Self::Aliased,
            11 => Self::Halted,
            _ => return None,
        })
    }

    /// Backpressure signals the orchestrator may retry after.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::OutOfSpace | Self::ChannelSaturated | Self::TimedOut)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OutOfSpace => "arena out of space",
            Self::InvalidSlot => "invalid slot",
            Self::BoundsViolation => "bounds violation",
            Self::UnknownOperation => "unknown operation",
            Self::ShapeMismatch => "shape mismatch",
            Self::TypeMismatch => "type mismatch",
            Self::ChannelSaturated => "channel saturated",
            Self::TimedOut => "timed out",
            Self::ExecutionFailed => "execution failed",
            Self::Aliased => "output aliases an input",
            Self::Halted => "dispatcher halted",
        };
        f.write_str(s)
    }
}

impl Error for ErrorCode {}

/// Errors reported by a kernel while it runs.
///
/// Returned by `Kernel::execute`. A [`BoundsViolation`] means the kernel
/// tried to touch memory the validation gate should have ruled out, and
/// the dispatcher halts the session on it.
///
/// [`BoundsViolation`]: KernelError::BoundsViolation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// The kernel could not complete.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The kernel reached outside the views it was given.
    BoundsViolation {
        /// What was out of range.
        detail: String,
    },
}

impl KernelError {
    /// Shorthand for [`KernelError::ExecutionFailed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`KernelError::BoundsViolation`].
    pub fn out_of_bounds(detail: impl Into<String>) -> Self {
        Self::BoundsViolation {
            detail: detail.into(),
        }
    }

    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ExecutionFailed { .. } => ErrorCode::ExecutionFailed,
            Self::BoundsViolation { .. } => ErrorCode::BoundsViolation,
        }
    }

    /// Whether the session must halt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::BoundsViolation { .. })
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::BoundsViolation { detail } => write!(f, "bounds violation: {detail}"),
        }
    }
}

impl Error for KernelError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for v in 1..=11u8 {
            let code = ErrorCode::from_u8(v).unwrap();
            assert_eq!(code.as_u8(), v);
        }
        assert_eq!(ErrorCode::from_u8(0), None);
        assert_eq!(ErrorCode::from_u8(12), None);
    }

    #[test]
    fn retryable_set() {
        assert!(ErrorCode::OutOfSpace.is_retryable());
        assert!(ErrorCode::ChannelSaturated.is_retryable());
        assert!(!ErrorCode::BoundsViolation.is_retryable());
        assert!(!ErrorCode::ShapeMismatch.is_retryable());
    }

    #[test]
    fn only_bounds_violation_is_fatal() {
        assert!(KernelError::out_of_bounds("index 70 of 64").is_fatal());
        assert!(!KernelError::failed("nan").is_fatal());
        assert_eq!(KernelError::failed("x").code(), ErrorCode::ExecutionFailed);
    }
}
