//! Lockstep session: the caller drives the dispatcher.
//!
//! [`Session`] owns both halves of the bridge on one thread. Commands are
//! submitted through the host adapter and sit in the command ring until
//! [`step`](Session::step) or [`run_until_idle`](Session::run_until_idle)
//! is called. Tests and single-threaded embedders use this mode.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;
use weir_arena::{Arena, ArenaHandshake};
use weir_core::{OpId, SlotDescriptor};
use weir_registry::{KernelLibrary, LoadMode, Manifest, OperationRegistry};
use weir_ring::channel;

use crate::config::{ConfigError, SessionConfig};
use crate::dispatcher::{Dispatcher, Processed};
use crate::host::{Handle, HostAdapter, HostError, Outcome, Poll};
use crate::idle::Idle;
use crate::metrics::{DispatchMetrics, HostMetrics};

// ── ShutdownReport ────────────────────────────────────────────────

/// Final state of a session after shutdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Commands processed by the final drain.
    pub drained: usize,
    /// Dispatcher counters.
    pub dispatch: DispatchMetrics,
    /// Host adapter counters.
    pub host: HostMetrics,
    /// Whether a kernel overrun halted the dispatcher.
    pub halted: bool,
    /// Whether the arena guard region was intact.
    pub arena_intact: bool,
    /// Whether the dispatcher was recovered cleanly (always true in
    /// lockstep mode; false if the realtime thread panicked).
    pub dispatcher_joined: bool,
    /// Time spent in shutdown.
    pub total_ms: u64,
}

// ── Assembly ──────────────────────────────────────────────────────

/// The shared pieces of a session before they are split across threads.
pub(crate) struct Parts {
    pub arena: Arc<Mutex<Arena>>,
    pub registry: Arc<OperationRegistry>,
    pub host: HostAdapter,
    pub dispatcher: Dispatcher,
}

/// Validate `config`, allocate the arena and rings, and wire both ends.
pub(crate) fn assemble(
    config: &SessionConfig,
    registry: OperationRegistry,
) -> Result<Parts, ConfigError> {
    config.validate()?;
    let arena = Arc::new(Mutex::new(Arena::new(config.arena.clone())?));
    let registry = Arc::new(registry);
    let (cmd_tx, cmd_rx) = channel(config.command_capacity);
    let (res_tx, res_rx) = channel(config.result_capacity);
    let (diag_tx, diag_rx) = crossbeam_channel::unbounded();
    let halted = Arc::new(AtomicBool::new(false));

    let host = HostAdapter::new(
        Arc::clone(&arena),
        cmd_tx,
        res_rx,
        diag_rx,
        Arc::clone(&halted),
        config.result_retention,
        config.idle.clone(),
    );
    let dispatcher = Dispatcher::new(
        Arc::clone(&arena),
        Arc::clone(&registry),
        cmd_rx,
        res_tx,
        diag_tx,
        halted,
        config.retry.clone(),
    );
    info!(
        arena_bytes = config.arena.capacity,
        command_slots = config.command_capacity,
        result_slots = config.result_capacity,
        operations = registry.len(),
        "session started"
    );
    Ok(Parts {
        arena,
        registry,
        host,
        dispatcher,
    })
}

// ── Session ───────────────────────────────────────────────────────

/// A session whose dispatcher runs only when the caller says so.
pub struct Session {
    config: SessionConfig,
    arena: Arc<Mutex<Arena>>,
    registry: Arc<OperationRegistry>,
    host: HostAdapter,
    dispatcher: Dispatcher,
}

impl Session {
    /// Start a session over an already-built registry.
    pub fn new(config: SessionConfig, registry: OperationRegistry) -> Result<Self, ConfigError> {
        let parts = assemble(&config, registry)?;
        Ok(Self {
            config,
            arena: parts.arena,
            registry: parts.registry,
            host: parts.host,
            dispatcher: parts.dispatcher,
        })
    }

    /// Load `manifest` against `library`, then start a session.
    pub fn from_manifest(
        config: SessionConfig,
        manifest: &Manifest,
        library: &KernelLibrary,
        mode: LoadMode,
    ) -> Result<Self, ConfigError> {
        let registry = OperationRegistry::load(manifest, library, mode)?;
        Self::new(config, registry)
    }

    /// `(base_offset, capacity)` of the arena.
    pub fn handshake(&self) -> ArenaHandshake {
        self.arena.lock().handshake()
    }

    /// The session's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The operation registry.
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// The host side.
    pub fn host(&self) -> &HostAdapter {
        &self.host
    }

    /// The host side, mutably.
    pub fn host_mut(&mut self) -> &mut HostAdapter {
        &mut self.host
    }

    /// The dispatcher side.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// See [`HostAdapter::submit`].
    pub fn submit(
        &mut self,
        op_id: impl Into<OpId>,
        inputs: &[SlotDescriptor],
        output: SlotDescriptor,
    ) -> Result<Handle, HostError> {
        self.host.submit(op_id, inputs, output)
    }

    /// See [`HostAdapter::poll`].
    pub fn poll(&mut self, handle: Handle) -> Result<Poll, HostError> {
        self.host.poll(handle)
    }

    /// Run the dispatcher for one command.
    pub fn step(&mut self) -> Option<Processed> {
        self.dispatcher.run_once()
    }

    /// Run the dispatcher until the command ring is empty.
    pub fn run_until_idle(&mut self) -> usize {
        self.dispatcher.drain()
    }

    /// Dispatch and poll until `handle` is ready or `timeout` elapses.
    pub fn wait(&mut self, handle: Handle, timeout: Duration) -> Result<Outcome, HostError> {
        let deadline = Instant::now() + timeout;
        let mut idle = Idle::new(&self.config.idle);
        loop {
            let progressed = self.dispatcher.run_once().is_some();
            if let Poll::Ready(outcome) = self.host.poll(handle)? {
                return Ok(outcome);
            }
            if Instant::now() >= deadline {
                return Err(HostError::TimedOut {
                    correlation_id: handle.correlation_id(),
                });
            }
            if progressed {
                idle.reset();
            } else {
                idle.snooze_until(deadline);
            }
        }
    }

    /// Submit, dispatch, and return the outcome in one call.
    pub fn call(
        &mut self,
        op_id: impl Into<OpId>,
        inputs: &[SlotDescriptor],
        output: SlotDescriptor,
    ) -> Result<Outcome, HostError> {
        let handle = self.submit(op_id, inputs, output)?;
        self.run_until_idle();
        match self.poll(handle)? {
            Poll::Ready(outcome) => Ok(outcome),
            Poll::Pending => Err(HostError::TimedOut {
                correlation_id: handle.correlation_id(),
            }),
        }
    }

    /// Whether a kernel overrun has halted the dispatcher.
    pub fn is_halted(&self) -> bool {
        self.dispatcher.is_halted()
    }

    /// Drain outstanding commands and report final state.
    pub fn shutdown(mut self) -> ShutdownReport {
        let start = Instant::now();
        let drained = self.dispatcher.drain();
        self.host.pump();
        let report = ShutdownReport {
            drained,
            dispatch: self.dispatcher.metrics().clone(),
            host: self.host.metrics().clone(),
            halted: self.dispatcher.is_halted(),
            arena_intact: self.arena.lock().check_integrity(),
            dispatcher_joined: true,
            total_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            drained,
            completed = report.dispatch.completed,
            failed = report.dispatch.failed,
            halted = report.halted,
            "session stopped"
        );
        report
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("host", &self.host)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
