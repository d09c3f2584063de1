//! Record codec errors.

use std::error::Error;
use std::fmt;

use weir_core::ErrorCode;

/// Errors from encoding or decoding a fixed-size record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// The record does not fit a ring slot.
    Overflow {
        /// Bytes the record needs.
        needed: usize,
    },
    /// A field runs past the end of the slot.
    Truncated {
        /// What was being read.
        field: &'static str,
    },
    /// More inputs than a command can carry.
    TooManyInputs {
        /// The count found.
        count: usize,
    },
    /// A descriptor rank above the wire maximum.
    RankTooLarge {
        /// The rank found.
        rank: usize,
    },
    /// An element kind tag that names no kind.
    UnknownElementKind {
        /// The tag found.
        tag: u8,
    },
    /// A status byte other than 0 or 1.
    UnknownStatus {
        /// The byte found.
        tag: u8,
    },
    /// An error code byte that names no code.
    UnknownErrorCode {
        /// The byte found.
        code: u8,
    },
}

impl CodecError {
    /// Wire code reported for a command that fails to decode.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownElementKind { .. } => ErrorCode::TypeMismatch,
            _ => ErrorCode::ShapeMismatch,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow { needed } => {
                write!(f, "record needs {needed} bytes, slot holds {}", crate::RECORD_BYTES)
            }
            Self::Truncated { field } => write!(f, "record truncated while reading {field}"),
            Self::TooManyInputs { count } => {
                write!(f, "{count} inputs exceeds the maximum of {}", weir_core::MAX_INPUTS)
            }
            Self::RankTooLarge { rank } => {
                write!(f, "rank {rank} exceeds the maximum of {}", weir_core::MAX_RANK)
            }
            Self::UnknownElementKind { tag } => write!(f, "unknown element kind tag {tag}"),
            Self::UnknownStatus { tag } => write!(f, "unknown status tag {tag}"),
            Self::UnknownErrorCode { code } => write!(f, "unknown error code {code}"),
        }
    }
}

impl Error for CodecError {}
