use anyhow::{Context, Result};
use clap::Parser;
use soothsayer_core::{Configuration, Soothsayer};
use soothsayer_tools::logging::init_logging;
use soothsayer_tools::Simulator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Measure the keystrokes word prediction saves on a text.
#[derive(Parser)]
#[command(name = "soothsayer_simulator", version)]
struct Args {
    /// Case insensitive mode
    #[arg(short, long)]
    insensitive: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Text to simulate
    infile: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = match &args.config {
        Some(path) => Configuration::load_toml(path)
            .with_context(|| format!("load configuration {}", path.display()))?,
        None => Configuration::with_defaults(),
    };
    let soothsayer = Soothsayer::new(Arc::new(config)).context("initialise predictor")?;
    if soothsayer.activator().plugins().is_empty() {
        warn!("no predictive plugins configured, nothing will be predicted");
    }

    let text = std::fs::read_to_string(&args.infile)
        .with_context(|| format!("could not open file {}", args.infile.display()))?;
    let mut simulator = Simulator::new(soothsayer, args.insensitive);
    let words = simulator.tokenize(&text);
    let report = simulator.run(words)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}
