//! Weir: a zero-copy bridge between an orchestrator and sandboxed kernels.
//!
//! The orchestrator and the kernels share one fixed-size arena. Commands
//! and results carry only `(offset, length, kind, shape)` descriptors over
//! a pair of lock-free rings; payload bytes never move. Every command is
//! checked against its operation's shape contract and against the arena's
//! bounds before the kernel sees a single byte.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Weir sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use weir::prelude::*;
//!
//! let manifest = Manifest::from_json(r#"{
//!     "operations": [{
//!         "op_id": 1,
//!         "name": "negate",
//!         "input_contracts": [{"kind": "f32", "shape": [4]}],
//!         "output_contract": {"kind": "f32", "shape": [4]},
//!         "entry_symbol": "negate_f32"
//!     }]
//! }"#).unwrap();
//!
//! let mut session = Session::from_manifest(
//!     SessionConfig::with_arena_capacity(1024),
//!     &manifest,
//!     &KernelLibrary::builtin(),
//!     LoadMode::Strict,
//! ).unwrap();
//!
//! let input = session.host().allocate_tensor(ElementKind::F32, &[4]).unwrap();
//! let output = session.host().allocate_tensor(ElementKind::F32, &[4]).unwrap();
//! session.host().write_as(&input, &[1.0f32, -2.0, 3.0, -4.0]).unwrap();
//!
//! let outcome = session.call(1, &[input], output.clone()).unwrap();
//! assert_eq!(outcome, Ok(output.clone()));
//! assert_eq!(
//!     session.host().read_as::<f32>(&output).unwrap(),
//!     vec![-1.0, 2.0, -3.0, 4.0],
//! );
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `weir-core` | IDs, slot descriptors, records, error codes |
//! | [`arena`] | `weir-arena` | Shared arena and free list |
//! | [`ring`] | `weir-ring` | SPSC ring and wire codec |
//! | [`registry`] | `weir-registry` | Manifest, contracts, kernels |
//! | [`engine`] | `weir-engine` | Dispatcher, host adapter, sessions |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types shared across the trust boundary (`weir-core`).
pub use weir_core as types;

/// The shared arena (`weir-arena`).
pub use weir_arena as arena;

/// SPSC ring channel and fixed-size record codec (`weir-ring`).
pub use weir_ring as ring;

/// Operation manifest, shape contracts, and kernels (`weir-registry`).
///
/// Implement [`registry::Kernel`] to add routines, and register them in a
/// [`registry::KernelLibrary`] under their entry symbols.
pub use weir_registry as registry;

/// Dispatcher, host adapter, and sessions (`weir-engine`).
///
/// [`engine::Session`] for caller-driven dispatch,
/// [`engine::RealtimeSession`] for a background dispatcher thread.
pub use weir_engine as engine;

/// Common imports for typical Weir usage.
///
/// ```rust
/// use weir::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use weir_core::{
        CorrelationId, ElementKind, ErrorCode, KernelError, OpId, SlotDescriptor, Status,
    };

    // Arena
    pub use weir_arena::{Arena, ArenaConfig, ArenaError, ArenaHandshake};

    // Registry
    pub use weir_registry::{
        DimSpec, Kernel, KernelContext, KernelLibrary, LoadMode, Manifest, ManifestError,
        OperationRegistry, ShapeContract,
    };

    // Engine
    pub use weir_engine::{
        ConfigError, Handle, HostError, Outcome, Poll, RealtimeSession, Session, SessionConfig,
        ShutdownReport,
    };
}
