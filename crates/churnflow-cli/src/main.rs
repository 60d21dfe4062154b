//! Churnflow CLI entry point.
//!
//! Binary name: `churnflow`
//!
//! Parses CLI arguments, initializes tracing and the storage backends,
//! then runs the requested pipeline flow and reports the run outcome.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use churnflow_core::pipeline::{data_engineering, scoring, training};
use churnflow_core::pipeline::{DEFAULT_RESAMPLE_SEED, DEFAULT_TRIAL_BUDGET};
use churnflow_core::store::{KeyedStore, ObjectStore};
use churnflow_core::workflow::executor::FlowOutcome;
use churnflow_infra::{load_storage_config, FsKeyedStore, FsObjectStore};

#[derive(Parser)]
#[command(name = "churnflow", about = "Customer churn ML pipelines", version)]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Export spans to OpenTelemetry (stdout exporter)
    #[arg(long, global = true)]
    otel: bool,

    /// Data directory holding config.toml and the local bucket
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the model-ready train/test splits from the raw CSVs
    DataEngineering {
        /// Seed for the customer-id resample
        #[arg(long, default_value_t = DEFAULT_RESAMPLE_SEED)]
        seed: u64,
    },
    /// Search hyperparameters, fit, and persist the churn model
    Training {
        /// Number of evaluated search trials
        #[arg(long, default_value_t = DEFAULT_TRIAL_BUDGET)]
        trials: usize,
        /// Seed for hyperparameter sampling
        #[arg(long, default_value_t = DEFAULT_RESAMPLE_SEED)]
        seed: u64,
    },
    /// Score the test split with the persisted model
    Scoring,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    churnflow_observe::tracing_setup::init_tracing(verbosity_filter(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;

    let config = load_storage_config(&cli.data_dir).await;
    info!(
        data_dir = %cli.data_dir.display(),
        bucket = %config.bucket,
        "storage initialized"
    );
    let objects: Arc<dyn ObjectStore> =
        Arc::new(FsObjectStore::new(&cli.data_dir, config.clone()));

    let outcome = match cli.command {
        Commands::DataEngineering { seed } => data_engineering::run(objects, seed)
            .await
            .context("data engineering flow failed to execute")?,
        Commands::Training { trials, seed } => training::run(objects, trials, seed)
            .await
            .context("training flow failed to execute")?,
        Commands::Scoring => {
            let keyed: Arc<dyn KeyedStore> =
                Arc::new(FsKeyedStore::new(&cli.data_dir, &config));
            scoring::run(objects, keyed)
                .await
                .context("scoring flow failed to execute")?
        }
    };

    info!(
        run_id = %outcome.run.id,
        flow = outcome.run.flow_name.as_str(),
        status = ?outcome.run.status,
        "flow finished"
    );
    report(&outcome);
    churnflow_observe::tracing_setup::shutdown_tracing();
    Ok(())
}

fn verbosity_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info,churnflow=debug",
        _ => "trace",
    }
}

fn report(outcome: &FlowOutcome) {
    println!(
        "{} run {} {:?} ({} steps)",
        outcome.run.flow_name,
        outcome.run.id,
        outcome.run.status,
        outcome.statuses.len()
    );
    let mut steps: Vec<_> = outcome.statuses.iter().collect();
    steps.sort_by(|a, b| a.0.cmp(b.0));
    for (step, status) in steps {
        println!("  {step}: {status:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_env_filter() {
        assert_eq!(verbosity_filter(0, true), "error");
        assert_eq!(verbosity_filter(0, false), "warn");
        assert_eq!(verbosity_filter(1, false), "info,churnflow=debug");
        assert_eq!(verbosity_filter(2, false), "trace");
    }
}
