//! Single-producer/single-consumer ring channel for the Weir bridge.
//!
//! Two of these rings connect host and dispatcher: a command ring and a
//! result ring. Each slot holds one fixed-size record ([`RawRecord`],
//! 192 bytes) that refers to arena offsets; payload bytes never cross
//! the channel.
//!
//! [`channel`] returns a [`Producer`] and a [`Consumer`]. Neither half is
//! `Clone`, and both push and pop take `&mut self`, so the single-producer
//! and single-consumer constraints are enforced by the type system rather
//! than by a lock. Callers that want several producer threads wrap the
//! producer in their own mutex.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod ring;

pub use codec::{RawRecord, WireRecord, RECORD_BYTES, RECORD_WORDS};
pub use error::CodecError;
pub use ring::{channel, Consumer, Producer};
