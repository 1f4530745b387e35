use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use drift_core::io::frame::NdjsonSink;
use drift_core::rng::SEED_KEY;
use drift_core::{Configuration, RunSummary, Simulation};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "driftstep",
    about = "Batch runner writing larval drift trajectories as NDJSON"
)]
struct Args {
    /// Path to the JSON configuration document.
    #[arg(long, value_name = "PATH")]
    config: PathBuf,

    /// Output NDJSON file path.
    #[arg(long, value_name = "PATH")]
    out: PathBuf,

    /// Override `app.simulation.seed`.
    #[arg(long, value_name = "NUMBER")]
    seed: Option<u64>,
}

fn build_simulation(args: &Args) -> Result<Simulation> {
    let mut config = Configuration::load_from_path(&args.config)
        .with_context(|| format!("failed to read configuration {:?}", args.config))?;
    if let Some(seed) = args.seed {
        config.set(SEED_KEY, seed);
    }
    let file = File::create(&args.out).with_context(|| format!("failed to create {:?}", args.out))?;
    let sink = NdjsonSink::new(BufWriter::new(file));
    Simulation::from_config(config, Box::new(sink))
        .with_context(|| format!("invalid configuration {:?}", args.config))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut simulation = build_simulation(&args)?;

    let stop = simulation.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current step");
            stop.stop();
        }
    });

    let summary: RunSummary = tokio::task::spawn_blocking(move || simulation.run())
        .await
        .context("simulation task panicked")?
        .context("simulation failed")?;

    info!(
        steps = summary.steps,
        released = summary.released,
        alive = summary.alive,
        dead = ?summary.dead,
        records = summary.records,
        interrupted = summary.interrupted,
        out = ?args.out,
        "run complete"
    );
    Ok(())
}
