//! Shape contracts and the validation errors they produce.
//!
//! A [`ShapeContract`] names an element kind and a list of dimensions.
//! Each dimension is either a fixed extent or a symbol. Symbols are bound
//! on first use within one command and every later use must agree, which
//! is how `add: [n] x [n] -> [n]` is expressed.

use std::error::Error;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use weir_core::{ElementKind, ErrorCode, OpId, SlotDescriptor};

/// One dimension of a contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimSpec {
    /// The extent must equal this value.
    Fixed(u32),
    /// The extent binds to this name.
    Symbol(String),
}

impl fmt::Display for DimSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Symbol(s) => f.write_str(s),
        }
    }
}

/// Declared element kind and shape of one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeContract {
    /// Required element kind.
    pub kind: ElementKind,
    /// Required dimensions, outermost first.
    pub shape: Vec<DimSpec>,
}

impl ShapeContract {
    /// A contract with only fixed extents.
    pub fn fixed(kind: ElementKind, shape: &[u32]) -> Self {
        Self {
            kind,
            shape: shape.iter().map(|&d| DimSpec::Fixed(d)).collect(),
        }
    }

    /// A contract built from dimension specs.
    pub fn new(kind: ElementKind, shape: impl IntoIterator<Item = DimSpec>) -> Self {
        Self {
            kind,
            shape: shape.into_iter().collect(),
        }
    }

    /// Check `slot` against this contract, binding symbols in `bindings`.
    pub fn check(
        &self,
        role: SlotRole,
        slot: &SlotDescriptor,
        bindings: &mut IndexMap<String, u32>,
    ) -> Result<(), ValidationError> {
        if slot.kind != self.kind {
            return Err(ValidationError::TypeMismatch {
                slot: role,
                expected: self.kind,
                actual: slot.kind,
            });
        }
        if !slot.is_consistent() {
            return Err(ValidationError::InconsistentLength {
                slot: role,
                length: slot.length,
                expected: slot.expected_length(),
            });
        }
        if slot.rank() != self.shape.len() {
            return Err(ValidationError::RankMismatch {
                slot: role,
                expected: self.shape.len(),
                actual: slot.rank(),
            });
        }
        for (dim, (spec, &extent)) in self.shape.iter().zip(slot.shape.iter()).enumerate() {
            match spec {
                DimSpec::Fixed(want) if *want != extent => {
                    return Err(ValidationError::ExtentMismatch {
                        slot: role,
                        dim,
                        expected: *want,
                        actual: extent,
                    });
                }
                DimSpec::Fixed(_) => {}
                DimSpec::Symbol(name) => match bindings.get(name) {
                    Some(&bound) if bound != extent => {
                        return Err(ValidationError::SymbolMismatch {
                            slot: role,
                            symbol: name.clone(),
                            bound,
                            actual: extent,
                        });
                    }
                    Some(_) => {}
                    None => {
                        bindings.insert(name.clone(), extent);
                    }
                },
            }
        }
        Ok(())
    }
}

impl fmt::Display for ShapeContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.kind)?;
        for (i, d) in self.shape.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

/// Which slot of a command a validation error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotRole {
    /// Input at this position.
    Input(usize),
    /// The output slot.
    Output,
}

impl fmt::Display for SlotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(i) => write!(f, "input {i}"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Why a command was refused before execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// No registry entry for the op id.
    UnknownOperation {
        /// The unregistered id.
        op_id: OpId,
    },
    /// Wrong number of input slots.
    InputCount {
        /// Inputs the contract declares.
        expected: usize,
        /// Inputs the command carries.
        actual: usize,
    },
    /// Element kind differs from the contract.
    TypeMismatch {
        /// Offending slot.
        slot: SlotRole,
        /// Declared kind.
        expected: ElementKind,
        /// Kind in the command.
        actual: ElementKind,
    },
    /// Descriptor length disagrees with its own kind and shape.
    InconsistentLength {
        /// Offending slot.
        slot: SlotRole,
        /// Length in the command.
        length: u64,
        /// Length implied by kind and shape, if it does not overflow.
        expected: Option<u64>,
    },
    /// Rank differs from the contract.
    RankMismatch {
        /// Offending slot.
        slot: SlotRole,
        /// Declared rank.
        expected: usize,
        /// Rank in the command.
        actual: usize,
    },
    /// A fixed extent differs from the contract.
    ExtentMismatch {
        /// Offending slot.
        slot: SlotRole,
        /// Dimension index.
        dim: usize,
        /// Declared extent.
        expected: u32,
        /// Extent in the command.
        actual: u32,
    },
    /// A symbolic extent differs from its earlier binding.
    SymbolMismatch {
        /// Offending slot.
        slot: SlotRole,
        /// The symbol.
        symbol: String,
        /// Extent bound earlier in the command.
        bound: u32,
        /// Extent found here.
        actual: u32,
    },
}

impl ValidationError {
    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownOperation { .. } => ErrorCode::UnknownOperation,
            Self::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Self::InputCount { .. }
            | Self::InconsistentLength { .. }
            | Self::RankMismatch { .. }
            | Self::ExtentMismatch { .. }
            | Self::SymbolMismatch { .. } => ErrorCode::ShapeMismatch,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOperation { op_id } => write!(f, "unknown operation {op_id}"),
            Self::InputCount { expected, actual } => {
                write!(f, "expected {expected} inputs, got {actual}")
            }
            Self::TypeMismatch {
                slot,
                expected,
                actual,
            } => write!(f, "{slot}: expected {expected}, got {actual}"),
            Self::InconsistentLength {
                slot,
                length,
                expected,
            } => match expected {
                Some(e) => write!(f, "{slot}: length {length} does not match shape ({e} bytes)"),
                None => write!(f, "{slot}: shape overflows"),
            },
            Self::RankMismatch {
                slot,
                expected,
                actual,
            } => write!(f, "{slot}: expected rank {expected}, got {actual}"),
            Self::ExtentMismatch {
                slot,
                dim,
                expected,
                actual,
            } => write!(f, "{slot}: dim {dim} expected {expected}, got {actual}"),
            Self::SymbolMismatch {
                slot,
                symbol,
                bound,
                actual,
            } => write!(f, "{slot}: '{symbol}' bound to {bound}, got {actual}"),
        }
    }
}

impl Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32s(n: u32) -> SlotDescriptor {
        SlotDescriptor::tensor(0, ElementKind::F32, &[n]).unwrap()
    }

    #[test]
    fn fixed_contract_accepts_exact_shape() {
        let c = ShapeContract::fixed(ElementKind::F32, &[64]);
        let mut b = IndexMap::new();
        c.check(SlotRole::Input(0), &f32s(64), &mut b).unwrap();
    }

    #[test]
    fn wrong_extent_is_shape_mismatch() {
        let c = ShapeContract::fixed(ElementKind::F32, &[64]);
        let err = c
            .check(SlotRole::Input(0), &f32s(32), &mut IndexMap::new())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ShapeMismatch);
        assert!(matches!(
            err,
            ValidationError::ExtentMismatch {
                dim: 0,
                expected: 64,
                actual: 32,
                ..
            }
        ));
    }

    #[test]
    fn wrong_kind_is_type_mismatch() {
        let c = ShapeContract::fixed(ElementKind::F64, &[64]);
        let err = c
            .check(SlotRole::Output, &f32s(64), &mut IndexMap::new())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
    }

    #[test]
    fn wrong_rank_is_shape_mismatch() {
        let c = ShapeContract::fixed(ElementKind::F32, &[8, 8]);
        let err = c
            .check(SlotRole::Input(1), &f32s(64), &mut IndexMap::new())
            .unwrap_err();
        assert!(matches!(err, ValidationError::RankMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn forged_length_is_rejected() {
        let c = ShapeContract::fixed(ElementKind::F32, &[64]);
        let mut slot = f32s(64);
        slot.length = 4096;
        let err = c.check(SlotRole::Input(0), &slot, &mut IndexMap::new()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InconsistentLength {
                length: 4096,
                expected: Some(256),
                ..
            }
        ));
    }

    #[test]
    fn symbols_bind_across_slots() {
        let c = ShapeContract::new(ElementKind::F32, [DimSpec::Symbol("n".into())]);
        let mut b = IndexMap::new();
        c.check(SlotRole::Input(0), &f32s(10), &mut b).unwrap();
        c.check(SlotRole::Input(1), &f32s(10), &mut b).unwrap();
        let err = c.check(SlotRole::Output, &f32s(11), &mut b).unwrap_err();
        assert_eq!(
            err,
            ValidationError::SymbolMismatch {
                slot: SlotRole::Output,
                symbol: "n".into(),
                bound: 10,
                actual: 11
            }
        );
    }

    #[test]
    fn contract_json_mixes_fixed_and_symbolic_dims() {
        let c: ShapeContract = serde_json::from_str(r#"{"kind":"u8","shape":["n",3]}"#).unwrap();
        assert_eq!(
            c,
            ShapeContract::new(
                ElementKind::U8,
                [DimSpec::Symbol("n".into()), DimSpec::Fixed(3)]
            )
        );
        assert_eq!(c.to_string(), "u8[n, 3]");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn symbol_binds_first_extent(a in 1u32..512, b in 1u32..512) {
                let c = ShapeContract::new(ElementKind::F32, [DimSpec::Symbol("n".into())]);
                let mut bindings = IndexMap::new();
                c.check(SlotRole::Input(0), &f32s(a), &mut bindings).unwrap();
                prop_assert_eq!(bindings.get("n"), Some(&a));

                let second = c.check(SlotRole::Input(1), &f32s(b), &mut bindings);
                if a == b {
                    prop_assert!(second.is_ok());
                } else {
                    let err = second.unwrap_err();
                    prop_assert_eq!(err.code(), ErrorCode::ShapeMismatch);
                }
            }
        }
    }
}
