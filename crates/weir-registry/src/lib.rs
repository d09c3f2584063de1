//! Operation registry for the Weir bridge.
//!
//! The registry maps an [`OpId`](weir_core::OpId) to a compiled routine
//! (a [`Kernel`]) and the shape contracts its arguments must satisfy. It is
//! loaded once from a [`Manifest`] produced by the kernel generator,
//! resolving each entry's `entry_symbol` against a [`KernelLibrary`], and
//! is immutable afterwards.
//!
//! [`OperationRegistry::validate`] is the gate between an untrusted
//! command and kernel execution: a command reaches its kernel only if
//! every slot matches the declared element kind and shape.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod contract;
pub mod kernel;
pub mod kernels;
pub mod library;
pub mod manifest;
pub mod registry;

pub use contract::{DimSpec, ShapeContract, SlotRole, ValidationError};
pub use kernel::{declares_kinds, Kernel, KernelContext};
pub use library::KernelLibrary;
pub use manifest::{Manifest, ManifestEntry, ManifestError, MANIFEST_VERSION};
pub use registry::{LoadMode, OperationRegistry, RegistryBuilder, RegistryEntry};
