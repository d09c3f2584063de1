//! Slot descriptors: logical tensor views over arena bytes.
//!
//! A [`SlotDescriptor`] never owns memory. It names a byte range of the
//! arena by `(offset, length)` and says how to interpret it. Descriptors
//! are the only thing that crosses the ring channel; payload bytes stay
//! where they are.

use crate::element::ElementKind;
use smallvec::SmallVec;

/// Maximum tensor rank a descriptor can carry on the wire.
pub const MAX_RANK: usize = 4;

/// Ordered tensor extents, outermost first.
pub type Shape = SmallVec<[u32; MAX_RANK]>;

/// A typed `(offset, length)` view into the arena.
///
/// Well-formed descriptors satisfy
/// `length == product(shape) * kind.size()`; see [`is_consistent`].
/// Descriptors decoded from the wire are not trusted to be well-formed
/// and are checked at the validation gate.
///
/// [`is_consistent`]: SlotDescriptor::is_consistent
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotDescriptor {
    /// Byte offset from the arena base.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
    /// Element type.
    pub kind: ElementKind,
    /// Tensor extents.
    pub shape: Shape,
}

impl SlotDescriptor {
    /// Build a descriptor whose `length` is derived from `kind` and `shape`.
    ///
    /// Returns `None` if the byte length overflows `u64` or the rank
    /// exceeds [`MAX_RANK`].
    pub fn tensor(offset: u64, kind: ElementKind, shape: &[u32]) -> Option<Self> {
        if shape.len() > MAX_RANK {
            return None;
        }
        let length = byte_length(kind, shape)?;
        Some(Self {
            offset,
            length,
            kind,
            shape: Shape::from_slice(shape),
        })
    }

    /// A rank-1 `U8` descriptor covering `length` raw bytes.
    ///
    /// Returns `None` if `length` does not fit a `u32` extent.
    pub fn bytes(offset: u64, length: u64) -> Option<Self> {
        let extent = u32::try_from(length).ok()?;
        Some(Self {
            offset,
            length,
            kind: ElementKind::U8,
            shape: smallvec::smallvec![extent],
        })
    }

    /// A zero-length `U8` descriptor at offset 0.
    ///
    /// Stands in for the output of a command too malformed to decode.
    pub fn empty() -> Self {
        Self {
            offset: 0,
            length: 0,
            kind: ElementKind::U8,
            shape: smallvec::smallvec![0],
        }
    }

    /// Tensor rank.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Product of all extents, or `None` on overflow. Rank 0 is a scalar.
    pub fn element_count(&self) -> Option<u64> {
        element_count(&self.shape)
    }

    /// Byte length implied by `kind` and `shape`, or `None` on overflow.
    pub fn expected_length(&self) -> Option<u64> {
        byte_length(self.kind, &self.shape)
    }

    /// Whether `length` agrees with `kind` and `shape`.
    pub fn is_consistent(&self) -> bool {
        self.expected_length() == Some(self.length)
    }

    /// One past the last byte, or `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }

    /// Whether the two byte ranges share at least one byte.
    ///
    /// Zero-length ranges never overlap anything.
    pub fn overlaps(&self, other: &SlotDescriptor) -> bool {
        if self.length == 0 || other.length == 0 {
            return false;
        }
        let a_end = self.offset.saturating_add(self.length);
        let b_end = other.offset.saturating_add(other.length);
        self.offset < b_end && other.offset < a_end
    }

    /// A copy of this descriptor relocated to `offset`.
    pub fn at(&self, offset: u64) -> Self {
        Self {
            offset,
            ..self.clone()
        }
    }
}

fn element_count(shape: &[u32]) -> Option<u64> {
    shape
        .iter()
        .try_fold(1u64, |acc, &d| acc.checked_mul(u64::from(d)))
}

fn byte_length(kind: ElementKind, shape: &[u32]) -> Option<u64> {
    element_count(shape)?.checked_mul(kind.size())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_length_follows_shape() {
        let d = SlotDescriptor::tensor(0, ElementKind::F32, &[64]).unwrap();
        assert_eq!(d.length, 256);
        assert!(d.is_consistent());

        let d = SlotDescriptor::tensor(8, ElementKind::F64, &[2, 3, 4]).unwrap();
        assert_eq!(d.length, 2 * 3 * 4 * 8);
        assert_eq!(d.end(), Some(8 + 192));
    }

    #[test]
    fn scalar_rank_zero_has_one_element() {
        let d = SlotDescriptor::tensor(0, ElementKind::I32, &[]).unwrap();
        assert_eq!(d.element_count(), Some(1));
        assert_eq!(d.length, 4);
    }

    #[test]
    fn rank_above_limit_is_rejected() {
        assert!(SlotDescriptor::tensor(0, ElementKind::U8, &[1, 1, 1, 1, 1]).is_none());
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        assert!(
            SlotDescriptor::tensor(0, ElementKind::F64, &[u32::MAX, u32::MAX, u32::MAX]).is_none()
        );
    }

    #[test]
    fn tampered_length_is_inconsistent() {
        let mut d = SlotDescriptor::tensor(0, ElementKind::F32, &[64]).unwrap();
        d.length = 255;
        assert!(!d.is_consistent());
    }

    #[test]
    fn overlap_detection() {
        let a = SlotDescriptor::bytes(0, 256).unwrap();
        let b = SlotDescriptor::bytes(256, 256).unwrap();
        let c = SlotDescriptor::bytes(255, 2).unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
        assert!(!a.overlaps(&SlotDescriptor::bytes(10, 0).unwrap()));
    }

    #[test]
    fn end_overflow_is_none() {
        let d = SlotDescriptor::bytes(u64::MAX, 1).unwrap();
        assert_eq!(d.end(), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn kind() -> impl Strategy<Value = ElementKind> {
            prop::sample::select(ElementKind::ALL.to_vec())
        }

        proptest! {
            #[test]
            fn tensor_is_consistent_with_its_shape(
                offset in 0u64..1 << 20,
                kind in kind(),
                shape in prop::collection::vec(0u32..256, 0..=MAX_RANK),
            ) {
                let d = SlotDescriptor::tensor(offset, kind, &shape).unwrap();
                let elements: u64 = shape.iter().map(|&e| u64::from(e)).product();
                prop_assert!(d.is_consistent());
                prop_assert_eq!(d.length, elements * kind.size());
                prop_assert_eq!(d.rank(), shape.len());
            }

            #[test]
            fn element_tags_round_trip(tag in any::<u8>()) {
                match ElementKind::from_tag(tag) {
                    Some(kind) => prop_assert_eq!(kind.tag(), tag),
                    None => prop_assert!(ElementKind::ALL.iter().all(|k| k.tag() != tag)),
                }
            }

            #[test]
            fn overlap_is_symmetric(
                a_off in 0u64..512,
                a_len in 0u64..128,
                b_off in 0u64..512,
                b_len in 0u64..128,
            ) {
                let a = SlotDescriptor::bytes(a_off, a_len).unwrap();
                let b = SlotDescriptor::bytes(b_off, b_len).unwrap();
                prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
            }
        }
    }
}
