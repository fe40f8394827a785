//! devkv CLI
//!
//! Offline tools for a single store directory (`<data_dir>/<bundle>/<store_id>`).
//!
//! # Commands
//!
//! - `inspect` - Display store options and entry counts per device
//! - `dump` - Print live entries
//! - `verify` - Check every log frame

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// devkv command-line store tools.
#[derive(Parser)]
#[command(name = "devkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Secret the store's manager was configured with (encrypted stores)
    #[arg(global = true, long)]
    secret: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store options and entry counts per device
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print live entries in key order
    Dump {
        /// Only keys starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,

        /// Only entries written by this device
        #[arg(short, long)]
        device: Option<String>,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify log integrity
    Verify,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let secret = cli.secret.as_deref().map(str::as_bytes);
    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, secret, &format)?;
        }
        Commands::Dump {
            prefix,
            device,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for dump")?;
            let filter = commands::dump::Filter {
                prefix,
                device,
                limit,
            };
            commands::dump::run(&path, secret, &filter, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path, secret)?;
        }
        Commands::Version => {
            println!("devkv CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("log format v{}", devkv_core::FORMAT_VERSION);
        }
    }

    Ok(())
}
