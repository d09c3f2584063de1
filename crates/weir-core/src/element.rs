//! Element kinds for tensor views over arena bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar type of every element in a slot.
///
/// The discriminant is the wire tag written into a
/// [`SlotDescriptor`](crate::SlotDescriptor) on the ring channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ElementKind {
    /// 32-bit IEEE 754 float.
    F32 = 1,
    /// 64-bit IEEE 754 float.
    F64 = 2,
    /// 32-bit signed integer.
    I32 = 3,
    /// 64-bit signed integer.
    I64 = 4,
    /// Unsigned byte.
    U8 = 5,
}

impl ElementKind {
    /// All element kinds, in tag order.
    pub const ALL: [ElementKind; 5] = [Self::F32, Self::F64, Self::I32, Self::I64, Self::U8];

    /// Size of one element in bytes.
    pub fn size(self) -> u64 {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
            Self::U8 => 1,
        }
    }

    /// Wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a wire tag. Returns `None` for unknown tags.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::F32),
            2 => Some(Self::F64),
            3 => Some(Self::I32),
            4 => Some(Self::I64),
            5 => Some(Self::U8),
            _ => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
        };
        f.write_str(name)
    }
}
