//! `hts-loss` binary: inspect a loss configuration without a training loop.
//!
//! ```bash
//! cargo run -- weights --config loss.json
//! cargo run -- eval --config loss.json --batch 8 --seed 42
//! ```
//!
//! Output is JSON on stdout so the weight curve can be plotted by any tool.

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info};

use hts_loss::{CompositeLossEngine, LossConfig, Result, Tensor};

#[derive(Parser, Debug)]
#[command(name = "hts-loss", version, about = "Composite forecasting loss inspector", long_about = None)]
struct Args {
    /// JSON loss configuration; defaults are used when omitted.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the encoder and decoder weight curves.
    Weights,
    /// Evaluate the engine on a random batch and print the loss breakdown.
    Eval {
        #[arg(long, default_value_t = 4)]
        batch: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = match args.config.as_deref() {
        Some(path) => {
            info!("Loading loss configuration from {}", path.display());
            LossConfig::load_json(path)?
        }
        None => {
            info!("No configuration file provided, using defaults");
            LossConfig::default()
        }
    };

    let engine = CompositeLossEngine::new(config)?;

    let report = match args.command {
        Command::Weights => json!({
            "seq_length": engine.seq_length(),
            "enc": engine.enc_weights().map(|p| p.values()),
            "final": engine.final_weights().map(|p| p.values()),
        }),
        Command::Eval { batch, seed } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let shape = [batch, engine.seq_length()];
            let device = engine.device();
            let outputs = vec![
                Tensor::randn(&shape, &mut rng).to_device(device),
                Tensor::randn(&shape, &mut rng).to_device(device),
            ];
            let target = Tensor::randn(&shape, &mut rng).to_device(device);
            let output = engine.evaluate(&outputs, &target)?;
            info!(loss = output.loss, "evaluated random batch");
            json!({
                "loss": output.loss,
                "breakdown": output.breakdown,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
