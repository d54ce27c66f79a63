//! treesync CLI - tsync command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;
mod session;

/// Default configuration file, looked up in the working directory
const DEFAULT_CONFIG: &str = "treesync.toml";

/// treesync - incremental views over a project tree
#[derive(Parser)]
#[command(name = "tsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: ./treesync.toml, optional)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a fixture once and print every analyzer's snapshot
    Scan {
        /// TOML fixture describing the host tree
        fixture: PathBuf,
        /// Only analyze the project with this name
        #[arg(short, long)]
        project: Option<String>,
        /// Also track references to this document path
        #[arg(short, long)]
        document: Option<String>,
    },
    /// Watch a fixture and print deltas as it changes
    Watch {
        /// TOML fixture describing the host tree
        fixture: PathBuf,
        /// Only analyze the project with this name
        #[arg(short, long)]
        project: Option<String>,
        /// Also track references to this document path
        #[arg(short, long)]
        document: Option<String>,
    },
    /// Show the effective configuration
    Config,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    match cli.command {
        Commands::Scan { fixture, project, document } => {
            cmd::scan::run(&config_path, &fixture, project.as_deref(), document.as_deref())
        }
        Commands::Watch { fixture, project, document } => {
            cmd::watch::run(&config_path, &fixture, project.as_deref(), document.as_deref()).await
        }
        Commands::Config => cmd::config::run(&config_path),
    }
}
