//! `clotho` command-line entry point.
//!
//! Loads the dataset and feature settings files, runs the configured
//! workflow over both splits and prints the run report as JSON.
//! Exits with status 1 on the first failure.

mod settings;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use clotho_core::{RunReport, SplitCoordinator};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "clotho")]
#[command(about = "Create the Clotho dataset splits and extract their features", long_about = None)]
#[command(version)]
struct Cli {
    /// Dataset creation settings: a name under `settings/` or a path
    #[arg(short = 'd', long, default_value = "dataset_creation")]
    config_file_dataset: String,

    /// Feature extraction settings: a name under `settings/` or a path
    #[arg(short = 'f', long, default_value = "feature_extraction")]
    config_file_features: String,

    /// Override the worker count from the dataset settings
    #[arg(short = 'j', long, env = "CLOTHO_WORKERS")]
    nb_workers: Option<usize>,

    /// Print the effective settings and exit
    #[arg(long)]
    dump_settings: bool,

    /// Log progress at info level (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(Some(report)) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(err) => {
                    eprintln!("error: cannot serialize run report: {err}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Option<RunReport>> {
    let dataset = settings::load_dataset_settings(&cli.config_file_dataset, cli.nb_workers)?;
    let features = settings::load_feature_settings(&cli.config_file_features)?;

    if cli.dump_settings {
        let effective = serde_json::json!({
            "dataset": dataset,
            "features": features,
        });
        println!("{}", serde_json::to_string_pretty(&effective)?);
        return Ok(None);
    }

    let started = chrono::Utc::now();
    info!(
        started = %started.to_rfc3339(),
        workers = dataset.nb_workers,
        feature = %features.feature_ref(),
        "clotho starting"
    );

    let coordinator = SplitCoordinator::from_settings(&dataset, &features);
    let report = coordinator.run()?;

    let elapsed = chrono::Utc::now() - started;
    info!(
        elapsed_ms = elapsed.num_milliseconds(),
        splits = report.splits.len(),
        "clotho finished"
    );
    Ok(Some(report))
}
