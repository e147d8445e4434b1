//! gridallocd — the gridalloc daemon.
//!
//! Runs the allocation controller in the role its configuration names:
//! the solver node recomputes and publishes the plan every epoch, every
//! other node watches for new plans and keeps its cache current.
//!
//! # Usage
//!
//! ```text
//! gridallocd standalone --config /etc/gridalloc.toml --solver --watchers 2
//! gridallocd probe
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use gridalloc_core::DaemonConfig;

mod standalone;

const DEFAULT_LOG_FILTER: &str = "info,gridallocd=debug,gridalloc=debug";

#[derive(Parser)]
#[command(name = "gridallocd", about = "gridalloc allocation controller daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller with an in-process coordination store.
    Standalone {
        /// Path to a gridalloc.toml configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Run this node as the solver, regardless of the config file.
        #[arg(long)]
        solver: bool,

        /// Data directory for the registry database.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Solver epoch in seconds.
        #[arg(long)]
        epoch: Option<u64>,

        /// TTL in seconds of the lease each plan is published under.
        #[arg(long)]
        lease_ttl: Option<u64>,

        /// Extra watcher nodes to run against the same coordination store.
        #[arg(long, default_value = "0")]
        watchers: usize,
    },
    /// Print this node's probed resources as JSON.
    Probe {
        /// IP to report instead of the detected one.
        #[arg(long)]
        advertise_ip: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Standalone {
            config,
            solver,
            data_dir,
            epoch,
            lease_ttl,
            watchers,
        } => {
            let mut config = match config {
                Some(path) => DaemonConfig::from_file(&path)
                    .with_context(|| format!("loading config from {}", path.display()))?,
                None => DaemonConfig::default(),
            };
            if solver {
                config.is_solver_node = true;
            }
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            if let Some(secs) = epoch {
                config.epoch_duration_secs = secs;
            }
            if let Some(secs) = lease_ttl {
                config.lease_ttl_secs = secs;
            }
            standalone::run(config, watchers).await
        }
        Command::Probe { advertise_ip } => {
            let local = gridalloc_solver::local_node(advertise_ip.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&local)?);
            Ok(())
        }
    }
}
