//! Realtime session: the dispatcher runs on its own thread.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator thread(s)              Dispatcher thread ("weir-dispatch")
//!     |                                   |
//!     |--submit()--[host mutex]---------->| command ring try_pop
//!     |   command ring try_push           | registry.validate
//!     |                                   | arena split_io + kernel
//!     |<--poll()/wait()--[host mutex]-----| result ring try_push (bounded retry)
//!     |   result ring + diagnostics       | idle: spin → yield → park
//! ```
//!
//! The rings have no locks. Orchestrators serialize on a mutex around the
//! host adapter because the command ring has exactly one producer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use weir_arena::{Arena, ArenaHandshake};
use weir_core::{ElementKind, OpId, SlotDescriptor};
use weir_registry::{KernelLibrary, LoadMode, Manifest, OperationRegistry};

use crate::config::{ConfigError, IdleConfig, SessionConfig};
use crate::dispatcher::Dispatcher;
use crate::host::{Handle, HostAdapter, HostError, Outcome, Poll};
use crate::idle::Idle;
use crate::session::{assemble, ShutdownReport};

// ── Dispatch thread ───────────────────────────────────────────────

struct DispatchThread {
    dispatcher: Dispatcher,
    shutdown: Arc<AtomicBool>,
    idle: IdleConfig,
}

impl DispatchThread {
    /// Run until the shutdown flag is set, then drain what is left.
    ///
    /// Returns the dispatcher and the size of the final drain.
    fn run(mut self) -> (Dispatcher, usize) {
        let mut idle = Idle::new(&self.idle);
        while !self.shutdown.load(Ordering::Acquire) {
            if self.dispatcher.run_once().is_some() {
                idle.reset();
            } else {
                idle.snooze();
            }
        }
        let drained = self.dispatcher.drain();
        debug!(drained, "dispatcher thread stopping");
        (self.dispatcher, drained)
    }
}

// ── RealtimeSession ───────────────────────────────────────────────

/// A session whose dispatcher runs continuously on a background thread.
///
/// `submit`, `poll` and `wait` take `&self` and may be called from any
/// number of threads. Dropping the session shuts it down.
pub struct RealtimeSession {
    host: Mutex<HostAdapter>,
    arena: Arc<Mutex<Arena>>,
    registry: Arc<OperationRegistry>,
    shutdown_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<(Dispatcher, usize)>>,
    idle: IdleConfig,
    report: Option<ShutdownReport>,
}

impl RealtimeSession {
    /// Start a session and spawn its dispatcher thread.
    pub fn new(config: SessionConfig, registry: OperationRegistry) -> Result<Self, ConfigError> {
        let parts = assemble(&config, registry)?;
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let state = DispatchThread {
            dispatcher: parts.dispatcher,
            shutdown: Arc::clone(&shutdown_flag),
            idle: config.idle.clone(),
        };
        let thread = thread::Builder::new()
            .name("weir-dispatch".into())
            .spawn(move || state.run())
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("dispatcher thread: {e}"),
            })?;
        Ok(Self {
            host: Mutex::new(parts.host),
            arena: parts.arena,
            registry: parts.registry,
            shutdown_flag,
            thread: Some(thread),
            idle: config.idle,
            report: None,
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

    /// The operation registry.
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Whether the dispatcher thread is still accepting work.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Whether a kernel overrun has halted the dispatcher.
    pub fn is_halted(&self) -> bool {
        self.host.lock().is_halted()
    }

    /// See [`HostAdapter::submit`]. Fails with [`HostError::Halted`] once
    /// the session has shut down.
    pub fn submit(
        &self,
        op_id: impl Into<OpId>,
        inputs: &[SlotDescriptor],
        output: SlotDescriptor,
    ) -> Result<Handle, HostError> {
        let Some(thread) = &self.thread else {
            return Err(HostError::Halted);
        };
        let handle = self.host.lock().submit(op_id, inputs, output)?;
        thread.thread().unpark();
        Ok(handle)
    }

    /// See [`HostAdapter::poll`].
    pub fn poll(&self, handle: Handle) -> Result<Poll, HostError> {
        self.host.lock().poll(handle)
    }

    /// Poll until `handle` is ready or `timeout` elapses.
    ///
    /// The host lock is released between polls so other orchestrators
    /// can submit while this one waits.
    pub fn wait(&self, handle: Handle, timeout: Duration) -> Result<Outcome, HostError> {
        let deadline = Instant::now() + timeout;
        let mut idle = Idle::new(&self.idle);
        loop {
            if let Poll::Ready(outcome) = self.poll(handle)? {
                return Ok(outcome);
            }
            if Instant::now() >= deadline {
                return Err(HostError::TimedOut {
                    correlation_id: handle.correlation_id(),
                });
            }
            idle.snooze_until(deadline);
        }
    }

    /// Submit and wait in one call.
    pub fn call(
        &self,
        op_id: impl Into<OpId>,
        inputs: &[SlotDescriptor],
        output: SlotDescriptor,
        timeout: Duration,
    ) -> Result<Outcome, HostError> {
        let handle = self.submit(op_id, inputs, output)?;
        self.wait(handle, timeout)
    }

    // ── Arena helpers ───────────────────────────────────────────
    //
    // These lock the arena directly, never the host adapter.

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

    /// Overwrite `slot` with typed `values`.
    pub fn write_as<T: bytemuck::Pod>(
        &self,
        slot: &SlotDescriptor,
        values: &[T],
    ) -> Result<(), HostError> {
        Ok(self.arena.lock().write_as(slot, values)?)
    }

    /// Copy `slot` out of the arena as `T`s.
    pub fn read_as<T: bytemuck::Pod>(&self, slot: &SlotDescriptor) -> Result<Vec<T>, HostError> {
        Ok(self.arena.lock().view_as::<T>(slot)?.to_vec())
    }

    /// Stop the dispatcher after a final drain and report final state.
    ///
    /// Idempotent: later calls return the first report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if let Some(report) = &self.report {
            return report.clone();
        }
        let start = Instant::now();
        self.shutdown_flag.store(true, Ordering::Release);

        let (dispatch, drained, halted, dispatcher_joined) = match self.thread.take() {
            Some(handle) => {
                handle.thread().unpark();
                match handle.join() {
                    Ok((dispatcher, drained)) => (
                        dispatcher.metrics().clone(),
                        drained,
                        dispatcher.is_halted(),
                        true,
                    ),
                    Err(_) => {
                        warn!("dispatcher thread panicked");
                        (Default::default(), 0, self.host.lock().is_halted(), false)
                    }
                }
            }
            None => (Default::default(), 0, self.host.lock().is_halted(), false),
        };

        let host = {
            let mut host = self.host.lock();
            host.pump();
            host.metrics().clone()
        };
        let report = ShutdownReport {
            drained,
            dispatch,
            host,
            halted,
            arena_intact: self.arena.lock().check_integrity(),
            dispatcher_joined,
            total_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            drained,
            completed = report.dispatch.completed,
            failed = report.dispatch.failed,
            halted,
            "realtime session stopped"
        );
        self.report = Some(report.clone());
        report
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        if self.report.is_none() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for RealtimeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSession")
            .field("running", &self.is_running())
            .field("operations", &self.registry.len())
            .finish_non_exhaustive()
    }
}

// Compile-time assertion: orchestrators share the session across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<RealtimeSession>();
};
