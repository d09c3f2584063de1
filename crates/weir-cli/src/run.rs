//! `weir run`: host a realtime session until told to stop.

use std::io::{self, BufRead};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use weir_engine::RealtimeSession;
use weir_registry::{KernelLibrary, Manifest};

use crate::SessionArgs;

/// A control line read from stdin.
#[derive(Debug, PartialEq, Eq)]
enum Control {
    Shutdown,
    Status,
    Ignore,
    Unknown(String),
}

fn parse_control(line: &str) -> Control {
    match line.trim() {
        "" => Control::Ignore,
        "shutdown" | "quit" => Control::Shutdown,
        "status" => Control::Status,
        other => Control::Unknown(other.to_string()),
    }
}

pub fn run(manifest_path: &Path, args: &SessionArgs) -> Result<()> {
    let manifest = Manifest::from_path(manifest_path)
        .with_context(|| format!("loading {}", manifest_path.display()))?;
    let mut session = RealtimeSession::from_manifest(
        args.config(),
        &manifest,
        &KernelLibrary::builtin(),
        args.load_mode(),
    )
    .context("starting session")?;

    let handshake = session.handshake();
    println!(
        "READY base_offset={} capacity={} operations={}",
        handshake.base_offset,
        handshake.capacity,
        session.registry().len()
    );

    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        match parse_control(&line) {
            Control::Shutdown => {
                info!("shutdown requested");
                break;
            }
            Control::Status => println!(
                "STATUS running={} halted={}",
                session.is_running(),
                session.is_halted()
            ),
            Control::Ignore => {}
            Control::Unknown(cmd) => warn!(command = %cmd, "unknown control line"),
        }
    }

    let report = session.shutdown();
    println!(
        "SHUTDOWN received={} completed={} failed={} dropped={} halted={} arena_intact={}",
        report.dispatch.received,
        report.dispatch.completed,
        report.dispatch.failed,
        report.dispatch.results_dropped,
        report.halted,
        report.arena_intact
    );
    if !report.arena_intact {
        bail!("arena guard region was overwritten");
    }
    Ok(())
}
