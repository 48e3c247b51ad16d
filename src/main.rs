mod config;
mod manager;

use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    sim_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sample the trajectory of the configured model.
    Trace,

    /// Compute the final size over a range of reproduction numbers.
    Sweep,

    /// Remove all output files.
    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mgr = Manager::new(args.sim_dir).context("failed to construct mgr")?;

    match args.command {
        Command::Trace => mgr.run_trace()?,
        Command::Sweep => mgr.run_sweep()?,
        Command::Clean => mgr.clean_sim()?,
    }

    Ok(())
}
