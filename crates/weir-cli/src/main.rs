//! weir: command-line host for the Weir arena bridge.
//!
//! - `weir run --manifest <path>` starts a realtime session and serves
//!   until stdin closes or a `shutdown` line arrives.
//! - `weir inspect --manifest <path>` validates a manifest and prints the
//!   resulting registry.
//! - `weir bench` measures dispatch throughput on the built-in kernels.

mod bench;
mod inspect;
mod run;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use weir_arena::ArenaConfig;
use weir_engine::SessionConfig;
use weir_registry::LoadMode;

#[derive(Parser)]
#[command(name = "weir")]
#[command(author, version, about = "Zero-copy arena bridge host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a manifest and serve dispatcher cycles until stdin closes
    Run {
        /// Operation manifest (JSON)
        #[arg(short, long, value_name = "PATH")]
        manifest: PathBuf,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Validate a manifest and print the operation registry
    Inspect {
        /// Operation manifest (JSON)
        #[arg(short, long, value_name = "PATH")]
        manifest: PathBuf,

        /// Skip entries whose symbol is unknown instead of failing
        #[arg(long)]
        lenient: bool,

        /// Print the normalized manifest as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Measure dispatch throughput (vectors/sec, MB/s)
    Bench {
        /// Dispatch cycles to run
        #[arg(short, long, default_value = "100000")]
        iterations: u64,

        /// Vectors per cycle
        #[arg(short, long, default_value = "1024")]
        batch: u32,

        /// Run the dispatcher on its own thread
        #[arg(long)]
        realtime: bool,

        #[command(flatten)]
        session: SessionArgs,
    },
}

/// Flags mapped onto [`SessionConfig`].
#[derive(Args, Clone, Debug)]
struct SessionArgs {
    /// Arena capacity in bytes
    #[arg(long, default_value_t = ArenaConfig::DEFAULT_CAPACITY)]
    arena_bytes: usize,

    /// Command ring slots (power of two)
    #[arg(long, default_value = "64")]
    command_slots: usize,

    /// Result ring slots (power of two)
    #[arg(long, default_value = "64")]
    result_slots: usize,

    /// Seconds an unclaimed result is kept
    #[arg(long, default_value = "60")]
    retention_secs: u64,

    /// Skip manifest entries whose symbol is unknown instead of failing
    #[arg(long)]
    lenient: bool,
}

impl SessionArgs {
    fn config(&self) -> SessionConfig {
        SessionConfig {
            arena: ArenaConfig::with_capacity(self.arena_bytes),
            command_capacity: self.command_slots,
            result_capacity: self.result_slots,
            result_retention: Duration::from_secs(self.retention_secs),
            ..SessionConfig::default()
        }
    }

    fn load_mode(&self) -> LoadMode {
        if self.lenient {
            LoadMode::Lenient
        } else {
            LoadMode::Strict
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { manifest, session } => run::run(&manifest, &session),
        Commands::Inspect {
            manifest,
            lenient,
            json,
        } => inspect::inspect(&manifest, lenient, json),
        Commands::Bench {
            iterations,
            batch,
            realtime,
            session,
        } => bench::bench(iterations, batch, realtime, &session),
    }
}
