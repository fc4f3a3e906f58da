//! # polis-cli
//!
//! Command-line interface for Polis policy modules.
//!
//! Works offline against a chain snapshot file (a saved `MemoryChain`):
//! - `polis validate`: parse, validate and normalize a target document
//! - `polis read`: derive a deployed module's config
//! - `polis deploy`: deploy a fresh module tree
//! - `polis plan`: reconcile a module to a target, optionally applying it

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use polis_core::{Family, PolisConfig};
use tracing_subscriber::EnvFilter;

use commands::ChainArgs;

/// Polis: reconcile deployed policy modules to declared targets.
#[derive(Parser)]
#[command(name = "polis", version, about)]
struct Cli {
    /// Path to polis.toml (defaults to ./polis.toml, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse, validate and normalize a target; print canonical JSON.
    Validate {
        /// Target policy document (YAML or JSON).
        target: PathBuf,
        /// Module family: security or hook.
        #[arg(long, default_value = "security")]
        family: Family,
    },
    /// Derive and print a deployed module's config.
    Read {
        #[command(flatten)]
        chain: ChainArgs,
        /// Module address.
        #[arg(long)]
        module: String,
    },
    /// Deploy a fresh module tree and print its address.
    Deploy {
        #[command(flatten)]
        chain: ChainArgs,
        /// Target policy document (YAML or JSON).
        target: PathBuf,
    },
    /// Print the plan that converges a module to a target.
    Plan {
        #[command(flatten)]
        chain: ChainArgs,
        /// Module address.
        #[arg(long)]
        module: String,
        /// Target policy document (YAML or JSON).
        target: PathBuf,
        /// Submit the plan's calls, each signed by its target's owner.
        #[arg(long)]
        apply: bool,
    },
}

/// Explicit path, else ./polis.toml if present, else the user config dir.
fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    let local = PathBuf::from("polis.toml");
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("polis").join("polis.toml"))
        .filter(|path| path.exists())
        .unwrap_or(local)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("polis_reconcile=info".parse()?)
                .add_directive("polis_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let path = config_path(cli.config);
    let settings = PolisConfig::load_or_default(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    tracing::debug!(config = %path.display(), chains = settings.chains.len(), "loaded config");

    match &cli.command {
        Commands::Validate { target, family } => {
            commands::validate::execute(&settings, target, *family)
        }
        Commands::Read { chain, module } => commands::read::execute(&settings, chain, module).await,
        Commands::Deploy { chain, target } => {
            commands::deploy::execute(&settings, chain, target).await
        }
        Commands::Plan {
            chain,
            module,
            target,
            apply,
        } => commands::plan::execute(&settings, chain, module, target, *apply).await,
    }
}
