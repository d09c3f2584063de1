//! Fixed-capacity shared arena for the Weir bridge.
//!
//! The [`Arena`] is one contiguous, 8-byte aligned allocation made at
//! session start and never resized. Everything that crosses the trust
//! boundary refers to it by `(offset, length)`; nothing is copied into a
//! second buffer.
//!
//! Allocation is a bump cursor backed by a free list keyed by size class
//! ([`FreeList`]). There is no compaction: when fragmentation leaves no
//! block large enough, [`Arena::allocate`] fails with
//! [`ArenaError::OutOfSpace`] and the caller treats that as backpressure.
//!
//! # Safety
//!
//! No `unsafe`. Byte and typed views go through `bytemuck`, and the
//! input/output split handed to kernels is built from `split_at_mut`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod arena;
pub mod config;
pub mod error;
pub mod freelist;
pub mod view;

pub use arena::{Arena, ArenaHandshake};
pub use config::ArenaConfig;
pub use error::ArenaError;
pub use freelist::FreeList;
pub use view::IoViews;
