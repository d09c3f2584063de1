//! Command and result records exchanged over the ring channel.

use crate::error::ErrorCode;
use crate::id::{CorrelationId, OpId, Sequence};
use crate::slot::SlotDescriptor;
use smallvec::SmallVec;

/// Maximum number of input slots one command may reference.
pub const MAX_INPUTS: usize = 4;

/// Input slot list of a command.
pub type Inputs = SmallVec<[SlotDescriptor; MAX_INPUTS]>;

/// A request to run one operation against arena slots.
///
/// Created by the host adapter on submit and consumed exactly once by
/// the dispatcher. Never mutated after enqueue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRecord {
    /// Host-assigned submission order.
    pub sequence: Sequence,
    /// Operation to run.
    pub op_id: OpId,
    /// Token echoed back in the result.
    pub correlation_id: CorrelationId,
    /// Input slots, in contract order.
    pub inputs: Inputs,
    /// Output slot.
    pub output: SlotDescriptor,
}

/// Outcome of a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The routine ran and wrote its output.
    Ok,
    /// The command failed; the output region may be untouched.
    Err(ErrorCode),
}

impl Status {
    /// Whether this is [`Status::Ok`].
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// The error code, if any.
    pub fn error(self) -> Option<ErrorCode> {
        match self {
            Self::Ok => None,
            Self::Err(code) => Some(code),
        }
    }
}

/// The dispatcher's answer to one command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultRecord {
    /// Copied from the command.
    pub correlation_id: CorrelationId,
    /// Outcome.
    pub status: Status,
    /// The command's output slot.
    pub output: SlotDescriptor,
}

impl ResultRecord {
    /// A successful result for `command`.
    pub fn completed(command: &CommandRecord) -> Self {
        Self {
            correlation_id: command.correlation_id,
            status: Status::Ok,
            output: command.output.clone(),
        }
    }

    /// A failed result carrying `code`.
    pub fn failed(correlation_id: CorrelationId, code: ErrorCode, output: SlotDescriptor) -> Self {
        Self {
            correlation_id,
            status: Status::Err(code),
            output,
        }
    }
}
