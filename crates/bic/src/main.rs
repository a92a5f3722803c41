use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::composite::{handle_composite_command, CompositeArgs};
use commands::process::{handle_process_command, ProcessArgs};

/// Bare-ice onset detection and compositing for PROMICE weather stations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Pipeline configuration (TOML). Falls back to BIC_CONFIG, then to defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Correct and detect the onset for every selected year of one station file
    Process(ProcessArgs),
    /// Process a directory of station files and composite them around their onsets
    Composite(CompositeArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Process(args) => handle_process_command(args, config).await,
        Command::Composite(args) => handle_composite_command(args, config).await,
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
