//! `weir bench`: dispatch throughput on the built-in vector kernels.
//!
//! Each cycle writes a batch of `u8` 3-vectors into the arena and
//! normalizes it into a second slot. Every 10th cycle also runs a
//! saturating add over the batch and every 20th a dot product, so the
//! mix exercises multi-input commands and a kind-changing output.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::info;
use weir_core::{ElementKind, SlotDescriptor};
use weir_engine::{HostError, Outcome, RealtimeSession, Session, ShutdownReport};
use weir_registry::{DimSpec, KernelLibrary, LoadMode, Manifest, ManifestEntry, ShapeContract};

use crate::SessionArgs;

const NORMALIZE_OP: u32 = 1;
const ADD_OP: u32 = 2;
const DOT_OP: u32 = 3;

const WAIT: Duration = Duration::from_secs(5);

fn bench_manifest() -> Manifest {
    let n = || DimSpec::Symbol("n".into());
    let vec3 = ShapeContract::new(ElementKind::U8, [n(), DimSpec::Fixed(3)]);
    let flat = ShapeContract::new(ElementKind::U8, [n()]);
    Manifest {
        version: weir_registry::MANIFEST_VERSION,
        operations: vec![
            ManifestEntry {
                op_id: NORMALIZE_OP,
                name: "normalize".into(),
                input_contracts: vec![vec3.clone()],
                output_contract: vec3,
                entry_symbol: "normalize_vec3_u8".into(),
            },
            ManifestEntry {
                op_id: ADD_OP,
                name: "add".into(),
                input_contracts: vec![flat.clone(), flat.clone()],
                output_contract: flat.clone(),
                entry_symbol: "saturating_add_u8".into(),
            },
            ManifestEntry {
                op_id: DOT_OP,
                name: "dot".into(),
                input_contracts: vec![flat.clone(), flat],
                output_contract: ShapeContract::fixed(ElementKind::I32, &[1]),
                entry_symbol: "dot_u8_i32".into(),
            },
        ],
    }
}

enum Driver {
    Lockstep(Session),
    Realtime(RealtimeSession),
}

impl Driver {
    fn call(
        &mut self,
        op_id: u32,
        inputs: &[SlotDescriptor],
        output: &SlotDescriptor,
    ) -> Result<Outcome, HostError> {
        match self {
            Self::Lockstep(s) => s.call(op_id, inputs, output.clone()),
            Self::Realtime(s) => s.call(op_id, inputs, output.clone(), WAIT),
        }
    }

    fn allocate_tensor(
        &self,
        kind: ElementKind,
        shape: &[u32],
    ) -> Result<SlotDescriptor, HostError> {
        match self {
            Self::Lockstep(s) => s.host().allocate_tensor(kind, shape),
            Self::Realtime(s) => s.allocate_tensor(kind, shape),
        }
    }

    fn write(&self, slot: &SlotDescriptor, bytes: &[u8]) -> Result<(), HostError> {
        match self {
            Self::Lockstep(s) => s.host().write(slot, bytes),
            Self::Realtime(s) => s.write_as(slot, bytes),
        }
    }

    fn shutdown(self) -> ShutdownReport {
        match self {
            Self::Lockstep(s) => s.shutdown(),
            Self::Realtime(mut s) => s.shutdown(),
        }
    }
}

pub fn bench(iterations: u64, batch: u32, realtime: bool, args: &SessionArgs) -> Result<()> {
    if batch == 0 {
        bail!("batch must be at least 1");
    }
    let manifest = bench_manifest();
    let library = KernelLibrary::builtin();
    let config = args.config();
    let mut driver = if realtime {
        Driver::Realtime(RealtimeSession::from_manifest(
            config,
            &manifest,
            &library,
            LoadMode::Strict,
        )?)
    } else {
        Driver::Lockstep(Session::from_manifest(
            config,
            &manifest,
            &library,
            LoadMode::Strict,
        )?)
    };

    let vectors = driver
        .allocate_tensor(ElementKind::U8, &[batch, 3])
        .context("allocating input batch")?;
    let normalized = driver
        .allocate_tensor(ElementKind::U8, &[batch, 3])
        .context("allocating output batch")?;
    let sum = driver
        .allocate_tensor(ElementKind::U8, &[batch * 3])
        .context("allocating sum")?;
    let dot = driver
        .allocate_tensor(ElementKind::I32, &[1])
        .context("allocating dot")?;
    let flat_in = SlotDescriptor::bytes(vectors.offset, vectors.length).context("flat input")?;
    let flat_out =
        SlotDescriptor::bytes(normalized.offset, normalized.length).context("flat output")?;

    let mut payload = vec![0u8; vectors.length as usize];
    let start = Instant::now();
    for i in 0..iterations {
        for (k, b) in payload.iter_mut().enumerate() {
            *b = (i as usize ^ k) as u8;
        }
        driver.write(&vectors, &payload)?;
        expect_ok(driver.call(NORMALIZE_OP, &[vectors.clone()], &normalized)?, "normalize")?;
        if i % 10 == 0 {
            expect_ok(driver.call(ADD_OP, &[flat_in.clone(), flat_out.clone()], &sum)?, "add")?;
        }
        if i % 20 == 0 {
            expect_ok(driver.call(DOT_OP, &[flat_in.clone(), flat_out.clone()], &dot)?, "dot")?;
        }
    }
    let elapsed = start.elapsed();

    let total_vectors = iterations as f64 * f64::from(batch);
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    let vectors_per_sec = total_vectors / secs;
    let mb_per_sec = total_vectors * 3.0 / secs / 1_048_576.0;
    println!("BENCHMARK: {vectors_per_sec:.2} vectors/sec | {mb_per_sec:.2} MB/s");

    let report = driver.shutdown();
    info!(
        completed = report.dispatch.completed,
        failed = report.dispatch.failed,
        kernel_us = report.dispatch.kernel_us,
        max_round_trip_us = report.host.max_round_trip_us,
        elapsed_ms = elapsed.as_millis() as u64,
        "benchmark finished"
    );
    if !report.arena_intact {
        bail!("arena integrity check failed after benchmark");
    }
    Ok(())
}

fn expect_ok(outcome: Outcome, what: &str) -> Result<()> {
    match outcome {
        Ok(_) => Ok(()),
        Err(code) => bail!("{what} failed: {code}"),
    }
}
