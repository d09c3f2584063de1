//! Out-of-band events from the dispatcher to the host.
//!
//! The result ring carries one record per command. Anything that cannot
//! travel that way (a result the ring refused, a halt) is sent here on an
//! unbounded crossbeam channel, so the host can attribute every failure to
//! a correlation id.

use std::fmt;

use weir_core::{CorrelationId, Status};

/// A dispatcher event delivered beside the result ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// The result for this command could not be pushed and was dropped.
    ResultDropped {
        /// The command whose result was lost.
        correlation_id: CorrelationId,
        /// The status the result would have carried.
        status: Status,
    },
    /// A kernel overran its views; the dispatcher accepts no more work.
    Halted {
        /// The command whose kernel overran.
        correlation_id: CorrelationId,
        /// Kernel-supplied detail.
        reason: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResultDropped {
                correlation_id,
                status,
            } => write!(
                f,
                "result for {correlation_id} dropped (channel saturated, status {status:?})"
            ),
            Self::Halted {
                correlation_id,
                reason,
            } => write!(f, "dispatcher halted by {correlation_id}: {reason}"),
        }
    }
}
