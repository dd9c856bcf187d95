//! meld CLI - `meld:id` XML templates from the command line.
//!
//! Provides commands for:
//! - `strip`: Remove `meld:id` markers from a template
//! - `find`: Print the element carrying a marker
//! - `fill`: Set the text of marked elements

mod commands;
mod error;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{FillArgs, FindArgs, StripArgs};
use output::Output;
use settings::GlobalArgs;

/// meld - `meld:id` XML templating.
#[derive(Parser)]
#[command(name = "meld", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serialize a template without its `meld:id` markers.
    Strip(StripArgs),
    /// Print the first element carrying a `meld:id`.
    Find(FindArgs),
    /// Fill marked elements with text.
    Fill(FillArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.global.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Strip(args) => args.execute(&cli.global, &output),
        Commands::Find(args) => args.execute(&cli.global, &output),
        Commands::Fill(args) => args.execute(&cli.global, &output),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
