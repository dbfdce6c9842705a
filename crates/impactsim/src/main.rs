use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod logging;
mod plan;
mod study;
mod tables;

use logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "impactsim")]
#[command(about = "Uncertainty and sensitivity studies for LCA models")]
struct Args {
    /// Directory for the log file (default: ~/.impactsim/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a study's input tables and show the planned runs
    Plan {
        /// Path to the study YAML file
        study: PathBuf,

        /// Snapshot the input tables into the results directory
        #[arg(long)]
        copy_inputs: bool,
    },
    /// Show base/low/high and random draws of one distribution string
    Sample {
        /// Distribution, e.g. "normal; mean=1; sd=0.1; base=1"
        spec: String,

        /// Number of draws
        #[arg(short, default_value_t = 10)]
        n: usize,

        /// Seed for reproducible draws
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".impactsim")
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let log_dir = args.log_dir.unwrap_or_else(default_log_dir);
    init_logging(&log_dir, &args.log_level)?;

    match args.command {
        Command::Plan { study, copy_inputs } => plan::plan_command(&study, copy_inputs)?,
        Command::Sample { spec, n, seed } => print!("{}", plan::sample_report(&spec, n, seed)?),
    }

    tracing::info!("impactsim finished");
    Ok(())
}
