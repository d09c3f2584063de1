//! Test kernels and registry fixtures for Weir development.
//!
//! Provides the kernels in [`fixtures`] plus builders for the standard
//! negate scenario: op 1 negates `f32[64]` into `f32[64]`.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::Arc;

use weir_core::ElementKind;
use weir_engine::{Session, SessionConfig};
use weir_registry::{
    Kernel, KernelLibrary, LoadMode, Manifest, OperationRegistry, RegistryBuilder, ShapeContract,
};

pub use fixtures::{FailingKernel, OverrunKernel, RecordingKernel};

/// Op id of the negate operation in every fixture registry.
pub const NEGATE_OP: u32 = 1;

/// Elements per negate slot.
pub const NEGATE_LEN: u32 = 64;

/// Manifest JSON for the negate scenario.
pub const NEGATE_MANIFEST: &str = r#"{
    "version": 1,
    "operations": [
        {
            "op_id": 1,
            "name": "negate",
            "input_contracts": [{"kind": "f32", "shape": [64]}],
            "output_contract": {"kind": "f32", "shape": [64]},
            "entry_symbol": "negate_f32"
        }
    ]
}"#;

/// The parsed negate manifest.
pub fn negate_manifest() -> Manifest {
    Manifest::from_json(NEGATE_MANIFEST).expect("fixture manifest is valid")
}

/// A registry builder that already holds the negate operation.
pub fn negate_builder() -> RegistryBuilder {
    let negate = KernelLibrary::builtin()
        .resolve("negate_f32")
        .expect("negate_f32 is built in");
    OperationRegistry::builder()
        .operation(
            NEGATE_OP,
            "negate",
            vec![f32_contract(NEGATE_LEN)],
            f32_contract(NEGATE_LEN),
            negate,
        )
        .expect("fixture operation is valid")
}

/// The negate registry, loaded through the manifest path.
pub fn negate_registry() -> OperationRegistry {
    OperationRegistry::load(&negate_manifest(), &KernelLibrary::builtin(), LoadMode::Strict)
        .expect("fixture manifest resolves")
}

/// Add a one-input `f32[len] -> f32[len]` operation backed by `kernel`.
pub fn with_unary_f32(
    builder: RegistryBuilder,
    op_id: u32,
    len: u32,
    kernel: Arc<dyn Kernel>,
) -> RegistryBuilder {
    let name = kernel.name().to_string();
    builder
        .operation(
            op_id,
            name,
            vec![f32_contract(len)],
            f32_contract(len),
            kernel,
        )
        .expect("fixture operation is valid")
}

/// `f32[len]`.
pub fn f32_contract(len: u32) -> ShapeContract {
    ShapeContract::fixed(ElementKind::F32, &[len])
}

/// A lockstep session over the negate registry with an arena of
/// `arena_capacity` bytes.
pub fn negate_session(arena_capacity: usize) -> Session {
    Session::new(
        SessionConfig::with_arena_capacity(arena_capacity),
        negate_registry(),
    )
    .expect("fixture session config is valid")
}
