//! Orchestrator-side API: submit commands, collect results.
//!
//! The [`HostAdapter`] owns the producer half of the command ring and the
//! consumer half of the result ring. Results are matched to outstanding
//! [`Handle`]s by correlation id; a result the dispatcher had to drop
//! arrives on the diagnostics channel instead and completes its handle
//! with [`ErrorCode::ChannelSaturated`].

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, warn};
use weir_arena::{Arena, ArenaError, ArenaHandshake};
use weir_core::{
    CommandRecord, CorrelationId, ElementKind, ErrorCode, OpId, ResultRecord, Sequence,
    SlotDescriptor, Status, MAX_INPUTS,
};
use weir_ring::{CodecError, Consumer, Producer};

use crate::config::IdleConfig;
use crate::diagnostics::Diagnostic;
use crate::idle::Idle;
use crate::metrics::HostMetrics;

// ── Handle ────────────────────────────────────────────────────────

/// A submitted command's claim ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(CorrelationId);

impl Handle {
    /// The correlation id carried on the wire.
    pub fn correlation_id(self) -> CorrelationId {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle {}", self.0)
    }
}

/// Outcome of a finished command: its output slot, or the failure code.
pub type Outcome = Result<SlotDescriptor, ErrorCode>;

/// Answer to [`HostAdapter::poll`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Poll {
    /// The command has not finished.
    Pending,
    /// The command finished; the handle is now claimed.
    Ready(Outcome),
}

impl Poll {
    /// Whether the command has finished.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

// ── HostError ─────────────────────────────────────────────────────

/// Errors from the host adapter API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostError {
    /// The command ring is full; retry later.
    ChannelSaturated,
    /// The dispatcher halted or the session shut down.
    Halted,
    /// More input slots than a command can carry.
    TooManyInputs {
        /// Inputs supplied.
        count: usize,
    },
    /// The handle was never issued, already claimed, or expired.
    UnknownHandle {
        /// The handle's correlation id.
        correlation_id: CorrelationId,
    },
    /// No result arrived before the deadline. The handle stays valid.
    TimedOut {
        /// The handle's correlation id.
        correlation_id: CorrelationId,
    },
    /// An arena helper failed.
    Arena(ArenaError),
    /// The command could not be encoded.
    Codec(CodecError),
}

impl HostError {
    /// Wire code for this error, if it has one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::ChannelSaturated => Some(ErrorCode::ChannelSaturated),
            Self::Halted => Some(ErrorCode::Halted),
            Self::TooManyInputs { .. } => Some(ErrorCode::ShapeMismatch),
            Self::TimedOut { .. } => Some(ErrorCode::TimedOut),
            Self::Arena(e) => Some(e.code()),
            Self::Codec(e) => Some(e.code()),
            Self::UnknownHandle { .. } => None,
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelSaturated => write!(f, "command ring saturated"),
            Self::Halted => write!(f, "dispatcher halted"),
            Self::TooManyInputs { count } => {
                write!(f, "{count} inputs exceeds the maximum of {MAX_INPUTS}")
            }
            Self::UnknownHandle { correlation_id } => {
                write!(f, "unknown or already claimed handle {correlation_id}")
            }
            Self::TimedOut { correlation_id } => {
                write!(f, "timed out waiting for {correlation_id}")
            }
            Self::Arena(e) => write!(f, "arena: {e}"),
            Self::Codec(e) => write!(f, "codec: {e}"),
        }
    }
}

impl Error for HostError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for HostError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

impl From<CodecError> for HostError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

// ── HostAdapter ───────────────────────────────────────────────────

struct Finished {
    outcome: Outcome,
    at: Instant,
}

/// Single-producer front end of a session.
///
/// Takes `&mut self` throughout: concurrent orchestrators serialize on a
/// mutex around the adapter, never on the ring.
pub struct HostAdapter {
    arena: Arc<Mutex<Arena>>,
    commands: Producer<CommandRecord>,
    results: Consumer<ResultRecord>,
    diagnostics: Receiver<Diagnostic>,
    halted: Arc<AtomicBool>,
    next_correlation: u64,
    next_sequence: Sequence,
    outstanding: IndexMap<CorrelationId, Instant>,
    finished: IndexMap<CorrelationId, Finished>,
    retention: Duration,
    idle: IdleConfig,
    metrics: HostMetrics,
}

impl HostAdapter {
    /// Wire an adapter to its rings and shared state.
    pub fn new(
        arena: Arc<Mutex<Arena>>,
        commands: Producer<CommandRecord>,
        results: Consumer<ResultRecord>,
        diagnostics: Receiver<Diagnostic>,
        halted: Arc<AtomicBool>,
        retention: Duration,
        idle: IdleConfig,
    ) -> Self {
        Self {
            arena,
            commands,
            results,
            diagnostics,
            halted,
            next_correlation: 1,
            next_sequence: Sequence(0),
            outstanding: IndexMap::new(),
            finished: IndexMap::new(),
            retention,
            idle,
            metrics: HostMetrics::default(),
        }
    }

    /// Enqueue `op_id` over `inputs` into `output`.
    ///
    /// Never blocks. The correlation id is consumed only when the ring
    /// accepts the command.
    pub fn submit(
        &mut self,
        op_id: impl Into<OpId>,
        inputs: &[SlotDescriptor],
        output: SlotDescriptor,
    ) -> Result<Handle, HostError> {
        if self.is_halted() {
            return Err(HostError::Halted);
        }
        if inputs.len() > MAX_INPUTS {
            return Err(HostError::TooManyInputs {
                count: inputs.len(),
            });
        }
        let correlation_id = CorrelationId(self.next_correlation);
        let command = CommandRecord {
            sequence: self.next_sequence,
            op_id: op_id.into(),
            correlation_id,
            inputs: inputs.iter().cloned().collect(),
            output,
        };
        if !self.commands.try_push(&command)? {
            self.metrics.saturated_rejections += 1;
            return Err(HostError::ChannelSaturated);
        }
        self.next_correlation += 1;
        self.next_sequence = self.next_sequence.next();
        self.outstanding.insert(correlation_id, Instant::now());
        self.metrics.submitted += 1;
        debug!(%correlation_id, op_id = %command.op_id, "submitted");
        Ok(Handle(correlation_id))
    }

    /// Non-blocking check on `handle`. A ready handle is claimed and
    /// becomes unknown afterwards.
    pub fn poll(&mut self, handle: Handle) -> Result<Poll, HostError> {
        self.pump();
        if let Some(done) = self.finished.shift_remove(&handle.0) {
            return Ok(Poll::Ready(done.outcome));
        }
        if self.outstanding.contains_key(&handle.0) {
            Ok(Poll::Pending)
        } else {
            Err(HostError::UnknownHandle {
                correlation_id: handle.0,
            })
        }
    }

    /// Poll until `handle` is ready or `timeout` elapses.
    ///
    /// Only useful when a dispatcher runs elsewhere; a lockstep session
    /// must drive its dispatcher between polls instead.
    pub fn wait(&mut self, handle: Handle, timeout: Duration) -> Result<Outcome, HostError> {
        let deadline = Instant::now() + timeout;
        let mut idle = Idle::new(&self.idle);
        loop {
            if let Poll::Ready(outcome) = self.poll(handle)? {
                return Ok(outcome);
            }
            if Instant::now() >= deadline {
                return Err(HostError::TimedOut {
                    correlation_id: handle.0,
                });
            }
            idle.snooze_until(deadline);
        }
    }

    /// Move everything the dispatcher has produced into the finished
    /// table and expire stale entries. Returns how many handles finished.
    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        while let Some(popped) = self.results.try_pop() {
            match popped {
                Ok(result) => {
                    self.metrics.results_received += 1;
                    let outcome = match result.status {
                        Status::Ok => Ok(result.output),
                        Status::Err(code) => Err(code),
                    };
                    n += usize::from(self.finish(result.correlation_id, outcome));
                }
                Err(e) => warn!(error = %e, "result record did not decode"),
            }
        }
        while let Ok(diagnostic) = self.diagnostics.try_recv() {
            match diagnostic {
                Diagnostic::ResultDropped { correlation_id, .. } => {
                    self.metrics.drops_reported += 1;
                    n += usize::from(self.finish(correlation_id, Err(ErrorCode::ChannelSaturated)));
                }
                Diagnostic::Halted { correlation_id, reason } => {
                    warn!(%correlation_id, %reason, "dispatcher reported halt");
                }
            }
        }
        self.expire();
        n
    }

    fn finish(&mut self, correlation_id: CorrelationId, outcome: Outcome) -> bool {
        let Some(submitted_at) = self.outstanding.shift_remove(&correlation_id) else {
            self.metrics.unmatched += 1;
            warn!(%correlation_id, "result matches no outstanding handle");
            return false;
        };
        let round_trip_us = submitted_at.elapsed().as_micros() as u64;
        self.metrics.round_trip_us += round_trip_us;
        self.metrics.max_round_trip_us = self.metrics.max_round_trip_us.max(round_trip_us);
        self.finished.insert(
            correlation_id,
            Finished {
                outcome,
                at: Instant::now(),
            },
        );
        true
    }

    fn expire(&mut self) {
        let now = Instant::now();
        let retention = self.retention;
        let before = self.finished.len();
        self.finished
            .retain(|_, done| now.duration_since(done.at) < retention);
        let expired = before - self.finished.len();
        if expired > 0 {
            self.metrics.expired += expired as u64;
            warn!(expired, "discarded unclaimed results past retention");
        }
    }

    /// Whether the dispatcher has halted.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Submitted commands with no result yet.
    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    /// Finished results not yet claimed.
    pub fn unclaimed(&self) -> usize {
        self.finished.len()
    }

    /// Commands sitting in the command ring.
    pub fn queued(&self) -> usize {
        self.commands.len()
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> &HostMetrics {
        &self.metrics
    }

    // ── Arena helpers ───────────────────────────────────────────

    /// `(base_offset, capacity)` of the shared arena.
    pub fn handshake(&self) -> ArenaHandshake {
        self.arena.lock().handshake()
    }

    /// Reserve `length` raw bytes.
    pub fn allocate(&self, length: u64) -> Result<SlotDescriptor, HostError> {
        Ok(self.arena.lock().allocate(length)?)
    }

    /// Reserve a tensor of `kind` with `shape`.
    pub fn allocate_tensor(
        &self,
        kind: ElementKind,
        shape: &[u32],
    ) -> Result<SlotDescriptor, HostError> {
        Ok(self.arena.lock().allocate_tensor(kind, shape)?)
    }

    /// Return `slot` to the free list.
    pub fn release(&self, slot: &SlotDescriptor) -> Result<(), HostError> {
        Ok(self.arena.lock().release(slot)?)
    }

    /// Overwrite `slot` with `bytes`.
    pub fn write(&self, slot: &SlotDescriptor, bytes: &[u8]) -> Result<(), HostError> {
        Ok(self.arena.lock().write(slot, bytes)?)
    }

    /// Overwrite `slot` with typed `values`.
    pub fn write_as<T: bytemuck::Pod>(
        &self,
        slot: &SlotDescriptor,
        values: &[T],
    ) -> Result<(), HostError> {
        Ok(self.arena.lock().write_as(slot, values)?)
    }

    /// Copy `slot` out of the arena.
    pub fn read(&self, slot: &SlotDescriptor) -> Result<Vec<u8>, HostError> {
        Ok(self.arena.lock().view(slot)?.to_vec())
    }

    /// Copy `slot` out of the arena as `T`s.
    pub fn read_as<T: bytemuck::Pod>(&self, slot: &SlotDescriptor) -> Result<Vec<T>, HostError> {
        Ok(self.arena.lock().view_as::<T>(slot)?.to_vec())
    }

    /// Run `f` with the arena locked.
    pub fn with_arena<R>(&self, f: impl FnOnce(&mut Arena) -> R) -> R {
        f(&mut self.arena.lock())
    }
}

impl fmt::Debug for HostAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostAdapter")
            .field("next_correlation", &self.next_correlation)
            .field("in_flight", &self.outstanding.len())
            .field("unclaimed", &self.finished.len())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_arena::ArenaConfig;
    use weir_ring::channel;

    struct Rig {
        host: HostAdapter,
        commands: Consumer<CommandRecord>,
        results: Producer<ResultRecord>,
        diagnostics: crossbeam_channel::Sender<Diagnostic>,
        halted: Arc<AtomicBool>,
    }

    fn rig(retention: Duration) -> Rig {
        let arena = Arc::new(Mutex::new(Arena::new(ArenaConfig::with_capacity(1024)).unwrap()));
        let (cmd_tx, cmd_rx) = channel(4);
        let (res_tx, res_rx) = channel(4);
        let (diag_tx, diag_rx) = crossbeam_channel::unbounded();
        let halted = Arc::new(AtomicBool::new(false));
        Rig {
            host: HostAdapter::new(
                arena,
                cmd_tx,
                res_rx,
                diag_rx,
                Arc::clone(&halted),
                retention,
                IdleConfig::default(),
            ),
            commands: cmd_rx,
            results: res_tx,
            diagnostics: diag_tx,
            halted,
        }
    }

    fn out() -> SlotDescriptor {
        SlotDescriptor::tensor(0, ElementKind::F32, &[4]).unwrap()
    }

    #[test]
    fn correlation_ids_are_monotonic_and_start_at_one() {
        let mut r = rig(Duration::from_secs(60));
        let a = r.host.submit(1, &[], out()).unwrap();
        let b = r.host.submit(1, &[], out()).unwrap();
        assert_eq!(a.correlation_id(), CorrelationId(1));
        assert_eq!(b.correlation_id(), CorrelationId(2));
        let first = r.commands.try_pop().unwrap().unwrap();
        assert_eq!(first.sequence, Sequence(0));
        assert_eq!(first.correlation_id, CorrelationId(1));
    }

    #[test]
    fn saturated_submit_does_not_consume_an_id() {
        let mut r = rig(Duration::from_secs(60));
        for _ in 0..4 {
            r.host.submit(1, &[], out()).unwrap();
        }
        assert_eq!(r.host.submit(1, &[], out()), Err(HostError::ChannelSaturated));
        assert_eq!(r.host.metrics().saturated_rejections, 1);
        r.commands.try_pop().unwrap().unwrap();
        let next = r.host.submit(1, &[], out()).unwrap();
        assert_eq!(next.correlation_id(), CorrelationId(5));
    }

    #[test]
    fn too_many_inputs_is_rejected_up_front() {
        let mut r = rig(Duration::from_secs(60));
        let inputs = vec![out(); MAX_INPUTS + 1];
        assert_eq!(
            r.host.submit(1, &inputs, out()),
            Err(HostError::TooManyInputs { count: 5 })
        );
        assert!(r.commands.is_empty());
    }

    #[test]
    fn halted_flag_blocks_submit() {
        let mut r = rig(Duration::from_secs(60));
        r.halted.store(true, Ordering::Release);
        assert_eq!(r.host.submit(1, &[], out()), Err(HostError::Halted));
    }

    #[test]
    fn poll_moves_from_pending_to_ready_to_unknown() {
        let mut r = rig(Duration::from_secs(60));
        let h = r.host.submit(1, &[], out()).unwrap();
        assert_eq!(r.host.poll(h).unwrap(), Poll::Pending);

        let cmd = r.commands.try_pop().unwrap().unwrap();
        assert!(r.results.try_push(&ResultRecord::completed(&cmd)).unwrap());
        assert_eq!(r.host.poll(h).unwrap(), Poll::Ready(Ok(out())));
        assert_eq!(
            r.host.poll(h),
            Err(HostError::UnknownHandle {
                correlation_id: h.correlation_id()
            })
        );
    }

    #[test]
    fn round_trip_time_is_measured_from_submit() {
        let mut r = rig(Duration::from_secs(60));
        let h = r.host.submit(1, &[], out()).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let cmd = r.commands.try_pop().unwrap().unwrap();
        assert!(r.results.try_push(&ResultRecord::completed(&cmd)).unwrap());
        assert!(r.host.poll(h).unwrap().is_ready());

        let metrics = r.host.metrics();
        assert!(metrics.max_round_trip_us >= 2_000);
        assert_eq!(metrics.round_trip_us, metrics.max_round_trip_us);
    }

    #[test]
    fn dropped_result_surfaces_as_channel_saturated() {
        let mut r = rig(Duration::from_secs(60));
        let h = r.host.submit(1, &[], out()).unwrap();
        r.diagnostics
            .send(Diagnostic::ResultDropped {
                correlation_id: h.correlation_id(),
                status: Status::Ok,
            })
            .unwrap();
        assert_eq!(
            r.host.poll(h).unwrap(),
            Poll::Ready(Err(ErrorCode::ChannelSaturated))
        );
        assert_eq!(r.host.metrics().drops_reported, 1);
    }

    #[test]
    fn fabricated_results_are_not_matched() {
        let mut r = rig(Duration::from_secs(60));
        let bogus = ResultRecord::failed(CorrelationId(77), ErrorCode::ExecutionFailed, out());
        assert!(r.results.try_push(&bogus).unwrap());
        assert_eq!(r.host.pump(), 0);
        assert_eq!(r.host.metrics().unmatched, 1);
        assert_eq!(r.host.unclaimed(), 0);
    }

    #[test]
    fn wait_times_out_and_handle_stays_valid() {
        let mut r = rig(Duration::from_secs(60));
        let h = r.host.submit(1, &[], out()).unwrap();
        let err = r.host.wait(h, Duration::from_millis(5)).unwrap_err();
        assert_eq!(
            err,
            HostError::TimedOut {
                correlation_id: h.correlation_id()
            }
        );
        assert_eq!(err.code(), Some(ErrorCode::TimedOut));
        assert_eq!(r.host.poll(h).unwrap(), Poll::Pending);
    }

    #[test]
    fn unclaimed_results_expire() {
        let mut r = rig(Duration::from_millis(1));
        let h = r.host.submit(1, &[], out()).unwrap();
        let cmd = r.commands.try_pop().unwrap().unwrap();
        assert!(r.results.try_push(&ResultRecord::completed(&cmd)).unwrap());
        r.host.pump();
        std::thread::sleep(Duration::from_millis(5));
        r.host.pump();
        assert_eq!(r.host.metrics().expired, 1);
        assert!(matches!(r.host.poll(h), Err(HostError::UnknownHandle { .. })));
    }

    #[test]
    fn arena_helpers_round_trip() {
        let r = rig(Duration::from_secs(60));
        let slot = r.host.allocate_tensor(ElementKind::I32, &[3]).unwrap();
        r.host.write_as(&slot, &[1i32, -2, 3]).unwrap();
        assert_eq!(r.host.read_as::<i32>(&slot).unwrap(), vec![1, -2, 3]);
        assert_eq!(r.host.read(&slot).unwrap().len(), 12);
        r.host.release(&slot).unwrap();
        assert!(matches!(
            r.host.release(&slot),
            Err(HostError::Arena(ArenaError::InvalidSlot { .. }))
        ));
        assert_eq!(r.host.handshake().capacity, 1024);
    }
}
