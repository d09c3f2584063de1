//! The sandbox-side command loop.
//!
//! Each command walks `Received → Validated → Executing → Completed |
//! Failed`. Validation covers the registry contract and the arena's
//! bounds, alignment and aliasing checks; only then is the kernel handed
//! views into the arena. Exactly one result record (or, if the result ring
//! stays full, one [`Diagnostic::ResultDropped`]) is produced per command.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, error, instrument, warn, Span};
use weir_arena::{Arena, ArenaError};
use weir_core::{
    CommandRecord, CorrelationId, ErrorCode, KernelError, OpId, ResultRecord, SlotDescriptor,
    Status,
};
use weir_registry::{KernelContext, OperationRegistry, ValidationError};
use weir_ring::{CodecError, Consumer, Producer, RawRecord, WireRecord};

use crate::config::RetryConfig;
use crate::diagnostics::Diagnostic;
use crate::metrics::DispatchMetrics;

// ── DispatchState ─────────────────────────────────────────────────

/// Where a command is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    /// Popped from the command ring.
    Received,
    /// Passed the contract and arena checks.
    Validated,
    /// The kernel is running.
    Executing,
    /// The kernel finished and the output is written.
    Completed,
    /// Refused or failed; the status carries the code.
    Failed,
}

// ── DispatchError ─────────────────────────────────────────────────

/// Why a command ended in [`DispatchState::Failed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchError {
    /// The ring record did not decode.
    Decode(CodecError),
    /// The command does not match its operation's contract.
    Validation(ValidationError),
    /// A slot failed the arena's bounds, alignment or aliasing checks.
    Arena(ArenaError),
    /// The kernel reported a failure.
    Kernel(KernelError),
    /// The dispatcher halted before this command was received.
    Halted,
}

impl DispatchError {
    /// Wire code carried in the result.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Decode(e) => e.code(),
            Self::Validation(e) => e.code(),
            Self::Arena(e) => e.code(),
            Self::Kernel(e) => e.code(),
            Self::Halted => ErrorCode::Halted,
        }
    }

    /// Whether the dispatcher must halt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Kernel(e) if e.is_fatal())
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Validation(e) => write!(f, "validation: {e}"),
            Self::Arena(e) => write!(f, "arena: {e}"),
            Self::Kernel(e) => write!(f, "kernel: {e}"),
            Self::Halted => write!(f, "dispatcher halted"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Validation(e) => Some(e),
            Self::Arena(e) => Some(e),
            Self::Kernel(e) => Some(e),
            Self::Halted => None,
        }
    }
}

impl From<CodecError> for DispatchError {
    fn from(e: CodecError) -> Self {
        Self::Decode(e)
    }
}

impl From<ValidationError> for DispatchError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<ArenaError> for DispatchError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

impl From<KernelError> for DispatchError {
    fn from(e: KernelError) -> Self {
        Self::Kernel(e)
    }
}

// ── Processed ─────────────────────────────────────────────────────

/// Summary of one dispatch cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Processed {
    /// The command's correlation id (read from the header if the record
    /// did not decode).
    pub correlation_id: CorrelationId,
    /// The requested operation, if the record decoded.
    pub op_id: Option<OpId>,
    /// Terminal state.
    pub state: DispatchState,
    /// Status sent back to the host.
    pub status: Status,
    /// Whether the result record reached the result ring.
    pub delivered: bool,
}

// ── Dispatcher ────────────────────────────────────────────────────

/// Consumes the command ring and produces the result ring.
///
/// Single-threaded by construction: it owns the consumer half of one ring
/// and the producer half of the other, and runs one command at a time.
pub struct Dispatcher {
    arena: Arc<Mutex<Arena>>,
    registry: Arc<OperationRegistry>,
    commands: Consumer<CommandRecord>,
    results: Producer<ResultRecord>,
    diagnostics: Sender<Diagnostic>,
    halted: Arc<AtomicBool>,
    retry: RetryConfig,
    metrics: DispatchMetrics,
}

impl Dispatcher {
    /// Wire a dispatcher to its rings and shared state.
    pub fn new(
        arena: Arc<Mutex<Arena>>,
        registry: Arc<OperationRegistry>,
        commands: Consumer<CommandRecord>,
        results: Producer<ResultRecord>,
        diagnostics: Sender<Diagnostic>,
        halted: Arc<AtomicBool>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            arena,
            registry,
            commands,
            results,
            diagnostics,
            halted,
            retry,
            metrics: DispatchMetrics::default(),
        }
    }

    /// Process at most one command. Returns `None` if the ring was empty.
    pub fn run_once(&mut self) -> Option<Processed> {
        let raw = self.commands.try_pop_raw()?;
        Some(self.process(&raw))
    }

    /// Process commands until the ring is empty. Returns how many ran.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while self.run_once().is_some() {
            n += 1;
        }
        n
    }

    /// Whether a kernel overrun has halted this dispatcher.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Commands waiting in the ring.
    pub fn pending(&self) -> usize {
        self.commands.len()
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// The registry commands are resolved against.
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    #[instrument(
        name = "dispatch",
        level = "debug",
        skip_all,
        fields(correlation_id = tracing::field::Empty, op_id = tracing::field::Empty)
    )]
    fn process(&mut self, raw: &RawRecord) -> Processed {
        self.metrics.received += 1;

        let (correlation_id, op_id, output, outcome) = match CommandRecord::decode(raw) {
            Ok(command) => {
                let span = Span::current();
                span.record("correlation_id", command.correlation_id.0);
                span.record("op_id", command.op_id.0);
                debug!("received");
                let outcome = self.execute(&command);
                (
                    command.correlation_id,
                    Some(command.op_id),
                    command.output,
                    outcome,
                )
            }
            Err(e) => {
                let correlation_id = raw.command_correlation_id();
                Span::current().record("correlation_id", correlation_id.0);
                self.metrics.decode_failures += 1;
                warn!(error = %e, "command record did not decode");
                (correlation_id, None, SlotDescriptor::empty(), Err(e.into()))
            }
        };

        let (state, status) = match outcome {
            Ok(()) => {
                self.metrics.completed += 1;
                debug!("completed");
                (DispatchState::Completed, Status::Ok)
            }
            Err(e) => {
                self.metrics.failed += 1;
                if e.is_fatal() {
                    self.halt(correlation_id, &e);
                } else {
                    debug!(error = %e, code = %e.code(), "failed");
                }
                (DispatchState::Failed, Status::Err(e.code()))
            }
        };

        let result = ResultRecord {
            correlation_id,
            status,
            output,
        };
        let delivered = self.deliver(&result);
        Processed {
            correlation_id,
            op_id,
            state,
            status,
            delivered,
        }
    }

    fn execute(&mut self, command: &CommandRecord) -> Result<(), DispatchError> {
        if self.is_halted() {
            self.metrics.refused_after_halt += 1;
            return Err(DispatchError::Halted);
        }

        let entry = self.registry.validate(command)?;
        let mut arena = self.arena.lock();
        for slot in command.inputs.iter().chain(std::iter::once(&command.output)) {
            arena.check_alignment(slot)?;
        }
        let views = arena.split_io(&command.inputs, &command.output)?;
        debug!(kernel = entry.kernel().name(), "validated");

        let mut ctx = KernelContext::new(&command.inputs, &command.output, views);
        let started = Instant::now();
        let outcome = entry.kernel().execute(&mut ctx);
        self.metrics.kernel_us += started.elapsed().as_micros() as u64;
        outcome.map_err(DispatchError::from)
    }

    fn halt(&mut self, correlation_id: CorrelationId, cause: &DispatchError) {
        self.halted.store(true, Ordering::Release);
        error!(error = %cause, "kernel overran its views, halting dispatcher");
        // The receiver is gone only once the host side is torn down.
        let _ = self.diagnostics.send(Diagnostic::Halted {
            correlation_id,
            reason: cause.to_string(),
        });
    }

    /// Push `result`, backing off while the ring is full.
    fn deliver(&mut self, result: &ResultRecord) -> bool {
        let raw = match result.to_raw() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "result record did not encode");
                return self.drop_result(result);
            }
        };
        let mut delay = self.retry.initial_backoff;
        for attempt in 1..=self.retry.max_attempts {
            if self.results.try_push_raw(&raw) {
                return true;
            }
            self.metrics.result_retries += 1;
            if attempt < self.retry.max_attempts {
                thread::sleep(delay);
                delay = self.retry.next_backoff(delay);
            }
        }
        warn!(
            attempts = self.retry.max_attempts,
            "result ring saturated, dropping result"
        );
        self.drop_result(result)
    }

    fn drop_result(&mut self, result: &ResultRecord) -> bool {
        self.metrics.results_dropped += 1;
        let _ = self.diagnostics.send(Diagnostic::ResultDropped {
            correlation_id: result.correlation_id,
            status: result.status,
        });
        false
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending())
            .field("halted", &self.is_halted())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

// Compile-time assertion: the dispatcher moves onto its own thread.
const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<Dispatcher>();
};
