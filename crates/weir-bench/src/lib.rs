//! Benchmark profiles and utilities for the Weir arena bridge.
//!
//! - [`vec3_registry`]: normalize, saturating add, and dot over `u8`
//!   3-vectors, backed by the built-in kernels
//! - [`Vec3Slots`]: the slots one vector cycle reads and writes
//! - [`fill_pattern`]: deterministic input bytes for a cycle

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use weir_core::{ElementKind, SlotDescriptor};
use weir_engine::{HostAdapter, HostError};
use weir_registry::{DimSpec, Kernel, KernelLibrary, OperationRegistry, ShapeContract};

/// Op id of `normalize_vec3_u8` in [`vec3_registry`].
pub const NORMALIZE_OP: u32 = 1;
/// Op id of `saturating_add_u8` in [`vec3_registry`].
pub const ADD_OP: u32 = 2;
/// Op id of `dot_u8_i32` in [`vec3_registry`].
pub const DOT_OP: u32 = 3;

fn builtin(symbol: &str) -> Arc<dyn Kernel> {
    KernelLibrary::builtin()
        .resolve(symbol)
        .unwrap_or_else(|| panic!("{symbol} is built in"))
}

/// Registry for the vector workload.
///
/// `u8[n, 3] -> u8[n, 3]` normalize, `u8[n] x u8[n] -> u8[n]` add,
/// `u8[n] x u8[n] -> i32[1]` dot.
pub fn vec3_registry() -> OperationRegistry {
    let n = || DimSpec::Symbol("n".into());
    let vec3 = ShapeContract::new(ElementKind::U8, [n(), DimSpec::Fixed(3)]);
    let flat = ShapeContract::new(ElementKind::U8, [n()]);
    OperationRegistry::builder()
        .operation(
            NORMALIZE_OP,
            "normalize",
            vec![vec3.clone()],
            vec3,
            builtin("normalize_vec3_u8"),
        )
        .and_then(|b| {
            b.operation(
                ADD_OP,
                "add",
                vec![flat.clone(), flat.clone()],
                flat.clone(),
                builtin("saturating_add_u8"),
            )
        })
        .and_then(|b| {
            b.operation(
                DOT_OP,
                "dot",
                vec![flat.clone(), flat],
                ShapeContract::fixed(ElementKind::I32, &[1]),
                builtin("dot_u8_i32"),
            )
        })
        .expect("vector operations are valid")
        .build()
}

/// Slots for one batch of `u8` 3-vectors.
#[derive(Clone, Debug)]
pub struct Vec3Slots {
    /// `u8[n, 3]` input.
    pub vectors: SlotDescriptor,
    /// `u8[n, 3]` normalize output.
    pub normalized: SlotDescriptor,
    /// `u8[3n]` add output.
    pub sum: SlotDescriptor,
    /// `i32[1]` dot output.
    pub dot: SlotDescriptor,
    /// The input viewed as `u8[3n]`.
    pub flat_vectors: SlotDescriptor,
    /// The normalize output viewed as `u8[3n]`.
    pub flat_normalized: SlotDescriptor,
}

impl Vec3Slots {
    /// Allocate slots for `batch` vectors through `host`.
    pub fn allocate(host: &HostAdapter, batch: u32) -> Result<Self, HostError> {
        let vectors = host.allocate_tensor(ElementKind::U8, &[batch, 3])?;
        let normalized = host.allocate_tensor(ElementKind::U8, &[batch, 3])?;
        let sum = host.allocate_tensor(ElementKind::U8, &[batch * 3])?;
        let dot = host.allocate_tensor(ElementKind::I32, &[1])?;
        Ok(Self {
            flat_vectors: reshape_flat(&vectors),
            flat_normalized: reshape_flat(&normalized),
            vectors,
            normalized,
            sum,
            dot,
        })
    }
}

fn reshape_flat(slot: &SlotDescriptor) -> SlotDescriptor {
    SlotDescriptor::bytes(slot.offset, slot.length).expect("byte view of an allocated slot")
}

/// Fill `buf` with the cycle-`cycle` input pattern.
pub fn fill_pattern(buf: &mut [u8], cycle: u64) {
    for (k, b) in buf.iter_mut().enumerate() {
        *b = (cycle as usize ^ k) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_registry_has_three_operations() {
        let registry = vec3_registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.lookup(DOT_OP.into()).unwrap().name, "dot");
    }

    #[test]
    fn fill_pattern_varies_by_cycle() {
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        fill_pattern(&mut a, 1);
        fill_pattern(&mut b, 2);
        assert_ne!(a, b);
        assert_eq!(a[0], 1);
    }
}
