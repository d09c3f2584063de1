//! Core types for the Weir zero-copy arena bridge.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! vocabulary shared by every other crate in the workspace: identifiers,
//! element kinds, slot descriptors, the command and result records that
//! cross the ring channel, and the wire-level error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod element;
pub mod error;
pub mod id;
pub mod record;
pub mod slot;

pub use element::ElementKind;
pub use error::{ErrorCode, KernelError};
pub use id::{CorrelationId, OpId, Sequence};
pub use record::{CommandRecord, Inputs, ResultRecord, Status, MAX_INPUTS};
pub use slot::{Shape, SlotDescriptor, MAX_RANK};
