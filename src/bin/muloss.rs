use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use muloss::{
    calibrate_predictions, load_model, save_model, AnalysisConfig, EventBatch, MomentumEstimator, MomentumLossFit,
    MomentumLossProcessor, MulossResult, PartitionExecutor, PersistedModel, Prediction, RunAccumulator, StorageError,
};

#[derive(Parser)]
#[command(name = "muloss")]
#[command(about = "Muon momentum-loss analysis", long_about = None)]
struct Cli {
    /// Analysis config TOML file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Associate and aggregate event batches into a run accumulator
    Process {
        /// JSON array of event batches
        #[arg(long)]
        events: PathBuf,

        /// Output JSON accumulator
        #[arg(short, long)]
        output: PathBuf,

        /// Worker threads (overrides the config)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Fit the loss model to an accumulator's (p, dp) histogram
    Fit {
        /// JSON accumulator written by `process`
        #[arg(long)]
        accumulator: PathBuf,

        /// Output model file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Calibrate the estimator on predicted momentum losses
    Calibrate {
        /// Model file written by `fit`
        #[arg(long)]
        model: PathBuf,

        /// JSON array of {"p": .., "dp": ..} predictions
        #[arg(long)]
        predictions: PathBuf,

        /// Optional JSON report output
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> MulossResult<T> {
    let bytes = fs::read(path).map_err(StorageError::from)?;
    let value = serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::Serialization(format!("{}: {e}", path.display())))?;
    Ok(value)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> MulossResult<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
    fs::write(path, bytes).map_err(StorageError::from)?;
    Ok(())
}

fn run(cli: Cli) -> MulossResult<()> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };

    match cli.command {
        Command::Process {
            events,
            output,
            workers,
        } => {
            if let Some(workers) = workers {
                config.executor.workers = workers;
                config.validate()?;
            }
            let batches: Vec<EventBatch> = read_json(&events)?;
            log::info!("processing {} batches with {} workers", batches.len(), config.executor.workers);
            let executor = PartitionExecutor::new(MomentumLossProcessor::from_config(&config)?, config.executor);
            let run = executor.run(batches)?;
            for (dataset, count) in run.all_events.iter() {
                log::info!("dataset '{dataset}': {count} events");
            }
            for (cut, count) in run.cutflow.iter() {
                log::info!("cutflow {cut}: {count}");
            }
            write_json(&output, &run)
        }
        Command::Fit { accumulator, output } => {
            let run: RunAccumulator = read_json(&accumulator)?;
            let fit = MomentumLossFit::from_histogram(&run.p_loss)?;
            let outcome = fit.fit_from_seed(&config.fit)?;
            let record = PersistedModel::from_outcome(&outcome)?;
            save_model(&output, &record)?;
            println!("{}", serde_json::to_string_pretty(&outcome).map_err(|e| StorageError::Serialization(e.to_string()))?);
            Ok(())
        }
        Command::Calibrate {
            model,
            predictions,
            output,
        } => {
            let record = load_model(&model)?;
            log::info!("using model {} fitted at {}", record.model_id, record.fitted_at);
            let estimator = MomentumEstimator::new(record.model, &config.estimator)?;
            let predictions: Vec<Prediction> = read_json(&predictions)?;
            let report = calibrate_predictions(&estimator, &predictions)?;
            match report.fit_residuals(&config.fit) {
                Ok(gauss) => println!(
                    "fraction in interval: {:.4}\nresidual center: {:.4}\nresidual sigma: {:.4}\nresidual FWHM: {:.4}",
                    report.fraction_in_interval,
                    gauss.mean,
                    gauss.sigma,
                    gauss.fwhm()
                ),
                Err(err) => {
                    log::warn!("residual fit failed: {err}");
                    println!("fraction in interval: {:.4}", report.fraction_in_interval);
                }
            }
            if let Some(output) = output {
                write_json(&output, &report)?;
            }
            Ok(())
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        log::error!("{err}");
        std::process::exit(1);
    }
}
