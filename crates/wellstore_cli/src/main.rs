//! WellStore CLI
//!
//! Command-line tools for WellStore maintenance.
//!
//! # Commands
//!
//! - `inspect` - Display version, log and collection statistics
//! - `migrate` - Show or apply pending schema upgrades
//! - `verify` - Replay the log and check it against the indexes
//! - `compact` - Rewrite the log as a single snapshot frame
//! - `dump` - Dump log frames or collection records for debugging

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wellstore_core::{DEFAULT_DIR, ENV_PATH};

/// WellStore command-line tools.
#[derive(Parser)]
#[command(name = "wellstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory (defaults to $WELLSTORE_PATH)
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display version, log and collection statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show or apply pending schema upgrades
    Migrate {
        /// Target version (defaults to the latest)
        #[arg(short, long)]
        to: Option<u32>,

        /// List pending steps without applying them
        #[arg(short, long)]
        dry_run: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay the log and check it against the indexes
    Verify,

    /// Rewrite the log as a single snapshot frame
    Compact {
        /// Show sizes without rewriting
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Dump log frames, or the records of one collection
    Dump {
        /// Dump this collection's records instead of the log
        #[arg(short, long)]
        collection: Option<String>,

        /// Maximum number of items to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn store_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| std::env::var_os(ENV_PATH).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let path = store_path(cli.path);
    match cli.command {
        Commands::Inspect { format } => {
            commands::inspect::run(&path, &format)?;
        }
        Commands::Migrate {
            to,
            dry_run,
            format,
        } => {
            commands::migrate::run(&path, to, dry_run, &format)?;
        }
        Commands::Verify => {
            commands::verify::run(&path)?;
        }
        Commands::Compact { dry_run } => {
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Dump {
            collection,
            limit,
            format,
        } => {
            commands::dump::run(&path, collection.as_deref(), limit, &format)?;
        }
        Commands::Version => {
            println!("WellStore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("WellStore Core v{}", wellstore_core::VERSION);
            println!(
                "Schema v{}",
                wellstore_core::schema::wellness::WELLNESS_SCHEMA_VERSION
            );
        }
    }

    Ok(())
}
