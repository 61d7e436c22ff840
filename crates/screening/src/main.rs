//! Screening CLI
//!
//! Validates datasets, trains and compares classifiers, and scores
//! applicants. Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use screening_engine::{
    parse_feature_records, parse_selection, FeatureVector, ScreeningConfig, ScreeningError,
    ScreeningService, SessionContext, TrainingOptions,
};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "screening")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Bootcamp applicant screening: dataset validation, training and scoring",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a dataset CSV and print headers, preview rows and every error
    Validate {
        /// Dataset CSV path
        input: PathBuf,
    },
    /// Train the selected algorithms on a dataset
    Train {
        /// Dataset CSV path
        input: PathBuf,

        /// Comma-separated algorithm ids
        #[arg(short, long, value_delimiter = ',', required = true)]
        algorithms: Vec<String>,

        /// Rebalance the training split with SMOTE
        #[arg(long)]
        smote: bool,

        /// Train with and without SMOTE and compare the runs
        #[arg(long)]
        compare: bool,
    },
    /// Score one applicant given as a JSON object
    Predict {
        /// Applicant JSON, inline or `@path`
        #[arg(short, long)]
        participant: String,

        /// Comma-separated model ids
        #[arg(short, long, value_delimiter = ',', required = true)]
        models: Vec<String>,
    },
    /// Score every row of an applicant CSV
    PredictBatch {
        /// Applicant CSV path
        input: PathBuf,

        /// Comma-separated model ids
        #[arg(short, long, value_delimiter = ',', required = true)]
        models: Vec<String>,
    },
}

fn load_config(path: Option<&Path>) -> Result<ScreeningConfig> {
    match path {
        Some(path) => ScreeningConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ScreeningConfig::from_env()),
    }
}

fn init_tracing(level: &str, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.common.config.as_deref())?;
    init_tracing(&config.logging.level, cli.common.verbose)?;

    info!("Screening engine v{}", screening_engine::VERSION);
    let service = ScreeningService::new(&config);

    match cli.command {
        Command::Validate { input } => {
            let text = read_text(&input)?;
            let report = service
                .validate_dataset(&text)
                .context("Failed to parse dataset")?;
            print_json(&json!({
                "valid": report.is_valid(),
                "headers": &report.headers,
                "sample_rows": &report.sample_rows,
                "row_count": report.row_count,
                "errors": report.messages(),
            }))?;
            if !report.is_valid() {
                std::process::exit(2);
            }
        }
        Command::Train {
            input,
            algorithms,
            smote,
            compare,
        } => {
            let ids = parse_selection(&algorithms)?;
            let text = read_text(&input)?;
            let dataset = service.load_dataset(&text)?;

            let mut ctx = SessionContext::new();
            let outcome = service
                .train(
                    &mut ctx,
                    &dataset,
                    &ids,
                    TrainingOptions {
                        use_smote: smote,
                        comparison_mode: compare,
                    },
                )
                .await
                .context("Training failed")?;

            let best = ScreeningService::best_algorithm(outcome.primary_run()).map(|(id, result)| {
                json!({
                    "id": id,
                    "name": result.name,
                    "f1_score": result.metrics.f1_score,
                })
            });
            print_json(&json!({ "outcome": outcome, "best_algorithm": best }))?;
        }
        Command::Predict {
            participant,
            models,
        } => {
            let ids = parse_selection(&models)?;
            let raw = if let Some(path) = participant.strip_prefix('@') {
                read_text(Path::new(path))?
            } else {
                participant.clone()
            };
            let value: serde_json::Value =
                serde_json::from_str(&raw).context("Participant is not valid JSON")?;
            let features =
                FeatureVector::from_json(&value).map_err(ScreeningError::ValidationFailed)?;

            let ctx = SessionContext::with_trained_models(ids.clone());
            let predictions = service.predict(&ctx, &features, &ids).await?;
            let recommendation = service.recommend(&ctx, &predictions);
            print_json(&json!({
                "predictions": predictions,
                "recommendation": recommendation,
            }))?;
        }
        Command::PredictBatch { input, models } => {
            let ids = parse_selection(&models)?;
            let text = read_text(&input)?;
            let records = parse_feature_records(&text)
                .with_context(|| format!("Failed to read participants from {}", input.display()))?;

            let ctx = SessionContext::with_trained_models(ids.clone());
            let slots = service.predict_batch(&ctx, &records, &ids).await?;
            print_json(&json!({ "results": slots }))?;
        }
    }

    Ok(())
}
