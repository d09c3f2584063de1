//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use weir_core::ErrorCode;

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// No free block or remaining tail is large enough.
    OutOfSpace {
        /// Number of bytes requested.
        requested: u64,
        /// Free bytes across the whole arena (possibly fragmented).
        available: u64,
    },
    /// Release of a range that is not a live allocation.
    InvalidSlot {
        /// Offset of the rejected slot.
        offset: u64,
        /// Length of the rejected slot.
        length: u64,
    },
    /// A slot reaches outside `[0, capacity)`.
    BoundsViolation {
        /// Offset of the rejected slot.
        offset: u64,
        /// Length of the rejected slot.
        length: u64,
        /// Arena capacity in bytes.
        capacity: u64,
    },
    /// A typed view does not fit the element type's alignment or size.
    Misaligned {
        /// Offset of the rejected slot.
        offset: u64,
        /// Length of the rejected slot.
        length: u64,
        /// Size of the requested element type.
        element_size: usize,
    },
    /// The output slot overlaps an input slot.
    Aliased {
        /// Position of the overlapping input.
        input: usize,
    },
    /// A tensor shape has too many dimensions or overflows.
    InvalidShape {
        /// Rank of the rejected shape.
        rank: usize,
    },
    /// Byte buffer length does not match the slot length.
    LengthMismatch {
        /// Slot length.
        expected: u64,
        /// Buffer length.
        actual: u64,
    },
    /// The configuration failed validation.
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },
}

impl ArenaError {
    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OutOfSpace { .. } => ErrorCode::OutOfSpace,
            Self::InvalidSlot { .. } => ErrorCode::InvalidSlot,
            Self::BoundsViolation { .. } | Self::Misaligned { .. } => ErrorCode::BoundsViolation,
            Self::Aliased { .. } => ErrorCode::Aliased,
            Self::InvalidShape { .. } | Self::LengthMismatch { .. } => ErrorCode::ShapeMismatch,
            Self::InvalidConfig { .. } => ErrorCode::InvalidSlot,
        }
    }
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfSpace {
                requested,
                available,
            } => write!(
                f,
                "arena out of space: requested {requested} bytes, {available} bytes free"
            ),
            Self::InvalidSlot { offset, length } => {
                write!(f, "no live allocation at offset {offset} with length {length}")
            }
            Self::BoundsViolation {
                offset,
                length,
                capacity,
            } => write!(
                f,
                "slot [{offset}, +{length}) exceeds arena capacity {capacity}"
            ),
            Self::Misaligned {
                offset,
                length,
                element_size,
            } => write!(
                f,
                "slot [{offset}, +{length}) is not a whole, aligned run of {element_size}-byte elements"
            ),
            Self::Aliased { input } => write!(f, "output slot overlaps input {input}"),
            Self::InvalidShape { rank } => write!(f, "invalid shape of rank {rank}"),
            Self::LengthMismatch { expected, actual } => {
                write!(f, "expected {expected} bytes, got {actual}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid arena config: {reason}"),
        }
    }
}

impl Error for ArenaError {}
