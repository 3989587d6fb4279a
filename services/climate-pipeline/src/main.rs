//! Humidity index and trend pipeline CLI.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use climate_pipeline::{Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "climate-pipeline")]
#[command(about = "Humidity indices and Mann-Kendall trends for gridded daily climate data")]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, env = "PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive daily relative humidity and RH90p from t2m/d2m inputs
    ComputeIndices {
        /// Input stores holding t2m and d2m
        #[arg(long, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Climatology baseline as START END (YYYY-MM-DD)
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        base_period: Option<Vec<NaiveDate>>,

        /// Output store
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Append warm-humid days and annual humidity statistics
    AddIndices {
        /// Indices store
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Compute per-cell trends for the configured variables
    TrendAnalysis {
        /// Indices store
        #[arg(long)]
        store: Option<PathBuf>,

        /// Directory for the trend stores
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Run every stage in sequence
    Run {
        /// Input stores holding t2m and d2m
        #[arg(long, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Indices store
        #[arg(long)]
        store: Option<PathBuf>,

        /// Directory for the trend stores
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// List the variables and groups of a store
    Inspect {
        /// Store to list
        store: PathBuf,
    },
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing; RUST_LOG overrides --log-level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = PipelineConfig::load(args.config.as_deref())?;

    match args.command {
        Command::ComputeIndices {
            inputs,
            base_period,
            out,
        } => {
            apply_inputs(&mut config, inputs);
            if let Some(period) = base_period {
                if let [start, end] = period[..] {
                    config.indices.baseline_start = start;
                    config.indices.baseline_end = end;
                }
            }
            if let Some(out) = out {
                config.store = out;
            }
            pipeline(config)?.compute_indices()?;
        }
        Command::AddIndices { store } => {
            if let Some(store) = store {
                config.store = store;
            }
            pipeline(config)?.add_indices()?;
        }
        Command::TrendAnalysis { store, out_dir } => {
            if let Some(store) = store {
                config.store = store;
            }
            if let Some(dir) = out_dir {
                config.trends_dir = dir;
            }
            pipeline(config)?.trend_analysis()?;
        }
        Command::Run {
            inputs,
            store,
            out_dir,
        } => {
            apply_inputs(&mut config, inputs);
            if let Some(store) = store {
                config.store = store;
            }
            if let Some(dir) = out_dir {
                config.trends_dir = dir;
            }
            pipeline(config)?.run()?;
        }
        Command::Inspect { store } => {
            let listing = Pipeline::list_store(&store)?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
    }

    Ok(())
}

fn apply_inputs(config: &mut PipelineConfig, inputs: Vec<PathBuf>) {
    if !inputs.is_empty() {
        config.inputs = inputs;
    }
}

fn pipeline(config: PipelineConfig) -> Result<Pipeline> {
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    info!(
        store = %config.store.display(),
        trends_dir = %config.trends_dir.display(),
        inputs = config.inputs.len(),
        baseline_start = %config.indices.baseline_start,
        baseline_end = %config.indices.baseline_end,
        "Starting climate pipeline"
    );
    Ok(Pipeline::new(config))
}
