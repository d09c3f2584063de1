//! Dispatcher, host adapter, and session lifecycle for Weir.
//!
//! A session ties together one [`Arena`](weir_arena::Arena), a command
//! ring, a result ring, a diagnostics channel and an
//! [`OperationRegistry`](weir_registry::OperationRegistry). The host side
//! ([`HostAdapter`]) submits commands that name arena slots; the sandbox
//! side ([`Dispatcher`]) validates each one, runs its kernel against
//! in-place views, and answers with exactly one result.
//!
//! Two modes are provided:
//!
//! - [`Session`]: lockstep. The caller steps the dispatcher.
//! - [`RealtimeSession`]: the dispatcher runs on a background thread and
//!   orchestrators may submit from any thread.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod host;
mod idle;
pub mod metrics;
pub mod realtime;
pub mod session;

pub use config::{ConfigError, IdleConfig, RetryConfig, SessionConfig};
pub use diagnostics::Diagnostic;
pub use dispatcher::{DispatchError, DispatchState, Dispatcher, Processed};
pub use host::{Handle, HostAdapter, HostError, Outcome, Poll};
pub use metrics::{DispatchMetrics, HostMetrics};
pub use realtime::RealtimeSession;
pub use session::{Session, ShutdownReport};
