//! ett-marl CLI.
//!
//! Trains on one instance, or on every instance of the data folder, one
//! run after another. Progress events are printed to stdout as JSON lines;
//! logs go to stderr and to `<output>/<instance>/<instance>.log`.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ett_marl::algorithms::Method;
use ett_marl::logging::InstanceLogLayer;
use ett_marl::progress::BroadcastSink;
use ett_marl::{RunSettings, TrainingService};

#[derive(Parser)]
#[command(name = "ett-marl")]
#[command(version)]
#[command(about = "Multi-agent RL course timetabling")]
struct Cli {
    /// Run settings document
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Override the method (Random, MultiAgentPPO, RecurrentMultiAgentPPO)
    #[arg(long)]
    method: Option<Method>,

    /// Shrink the epoch schedule for a smoke run
    #[arg(long)]
    quickrun: bool,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Train on this file of the data folder only
    #[arg(long)]
    file: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_settings(cli: &Cli) -> Result<RunSettings> {
    let text = fs::read_to_string(&cli.config)
        .with_context(|| format!("reading settings {}", cli.config.display()))?;
    let mut settings: RunSettings = serde_json::from_str(&text)
        .with_context(|| format!("parsing settings {}", cli.config.display()))?;
    if let Some(method) = cli.method {
        settings.method.name = method;
    }
    if cli.quickrun {
        settings.method.quickrun = true;
    }
    if let Some(seed) = cli.seed {
        settings.method.seed = seed;
    }
    if let Some(file) = &cli.file {
        settings.data.isthrough = false;
        settings.data.file = Some(file.clone());
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = read_settings(&cli)?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(InstanceLogLayer::new(&settings.output))
        .init();

    settings.validate().context("invalid settings")?;
    let instances = settings.instances()?;
    if instances.is_empty() {
        bail!("no instances found in {}", settings.data.folder.display());
    }
    info!(
        method = %settings.method.name,
        instances = instances.len(),
        quickrun = settings.method.quickrun,
        seed = settings.method.seed,
        "starting"
    );

    let sink = BroadcastSink::new(256);
    let mut viewer = sink.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match viewer.recv().await {
                Ok(message) => match serde_json::to_string(&message) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "cannot encode progress event"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "progress printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let service = TrainingService::new(settings.trainer_setup(), Arc::new(sink.clone()));
    let mut failures = 0usize;
    for path in instances {
        let (response, handle) = service.start(path.clone())?;
        println!("{}", serde_json::to_string(&response)?);
        match handle.join().await {
            Ok(report) => {
                let written = report.write_solution(&settings.output)?;
                info!(
                    instance = %report.instance,
                    path = %written.display(),
                    cancelled = report.outcome.cancelled,
                    "solution written"
                );
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "run failed");
                failures += 1;
            }
        }
    }

    drop(service);
    drop(sink);
    let _ = printer.await;

    if failures > 0 {
        bail!("{failures} run(s) failed");
    }
    Ok(())
}
