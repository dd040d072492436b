#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs patrol scenarios headlessly.

mod scenario;
mod simulation;

use std::{
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::{
    scenario::Scenario,
    simulation::{RunOptions, Simulation},
};

/// Command-line arguments for the warden binary.
#[derive(Debug, Parser)]
#[command(name = "warden", about = "Headless runner for stealth patrol scenarios")]
struct Cli {
    /// Log filter directive, overriding `RUST_LOG` (for example `warden_system_patrol=debug`).
    #[arg(long, global = true, value_name = "FILTER")]
    log: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs a scenario and prints the agents' event trace.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Scenario file to load. The bundled guard post scenario runs when omitted.
    #[arg(long, value_name = "PATH")]
    scenario: Option<PathBuf>,
    /// Overrides the number of ticks to simulate.
    #[arg(long)]
    ticks: Option<u32>,
    /// Overrides the fixed tick length in milliseconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    dt_ms: Option<u64>,
    /// Overrides the seed driving the wandering player.
    #[arg(long)]
    seed: Option<u64>,
    /// Prints one JSON object per event instead of plain text.
    #[arg(long)]
    trace_json: bool,
}

/// Entry point for the warden command-line interface.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref())?;

    match cli.command {
        Command::Run(args) => run(&args),
    }
}

fn init_tracing(directive: Option<&str>) -> Result<()> {
    let filter = match directive {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter {directive:?}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn run(args: &RunArgs) -> Result<()> {
    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::demo()?,
    };

    let settings = scenario.simulation;
    let options = RunOptions {
        ticks: args.ticks.unwrap_or(settings.ticks),
        dt: Duration::from_millis(args.dt_ms.unwrap_or(settings.dt_ms).max(1)),
        trace_json: args.trace_json,
    };
    let seed = args.seed.unwrap_or(settings.seed);

    let mut simulation = Simulation::new(&scenario, seed)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = simulation.run(&options, &mut out)?;
    if !options.trace_json {
        summary.write_to(&mut out)?;
    }
    out.flush().context("failed to flush trace output")?;
    Ok(())
}
