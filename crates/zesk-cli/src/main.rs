//! Zesk Command-Line Inspector
//!
//! Loads a bootstrap file and reports on the classes, modules and routes it
//! registers, or fetches a single row from the configured storage.

mod commands;
mod formatter;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use std::path::PathBuf;

/// Zesk Command-Line Inspector
#[derive(Parser, Debug)]
#[command(name = "zesk")]
#[command(version, about = "Inspect zesk class descriptors, modules and data")]
pub struct Args {
    /// Bootstrap file (application config plus module manifests)
    #[arg(short = 'b', long)]
    pub bootstrap: Option<PathBuf>,

    /// Use sled storage at this path instead of the configured backend
    #[arg(short = 'd', long)]
    pub data: Option<PathBuf>,

    /// Override the table prefix
    #[arg(long)]
    pub table_prefix: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Inspector subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List registered class descriptors
    Classes,
    /// List loaded modules
    Modules,
    /// List module routes in match order
    Routes,
    /// Boot the application and resolve every relation of every class
    Check,
    /// Fetch one row by id
    Get {
        /// Class name
        class: String,
        /// Id column value
        id: String,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("zesk_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let bootstrap = commands::load_bootstrap(&args)?;
    let formatter = formatter::create_formatter(args.format);
    let output = commands::execute(bootstrap, &args.command, &*formatter)?;
    println!("{}", output);
    Ok(())
}
