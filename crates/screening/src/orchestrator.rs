//! Training orchestration
//!
//! Drives a `Trainer` once (single mode) or twice (comparison mode), bounds
//! every call by a timeout, and normalizes the payloads. Either the whole
//! normalized structure comes back or an error does.

use crate::catalog::AlgorithmId;
use crate::comparison::{self, ContingencySource};
use crate::dataset::DatasetHandle;
use crate::errors::{Result, ScreeningError};
use crate::normalizer;
use crate::trainer::Trainer;
use crate::types::{AlgorithmResult, ComparisonResult, RunOutcome, TrainingRunResult};
use std::time::Duration;
use tracing::info;

/// Per-request switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrainingOptions {
    pub use_smote: bool,
    pub comparison_mode: bool,
}

/// How the orchestrator schedules trainer calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Upper bound for each trainer call
    pub timeout: Duration,
    /// Issue the two comparison-mode calls concurrently
    pub concurrent: bool,
    pub contingency: ContingencySource,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            concurrent: true,
            contingency: ContingencySource::default(),
        }
    }
}

/// Run training for `algorithms` on `dataset`.
///
/// In comparison mode `options.use_smote` is ignored: both variants run and
/// both must succeed.
pub async fn run(
    trainer: &dyn Trainer,
    dataset: &DatasetHandle,
    algorithms: &[AlgorithmId],
    options: TrainingOptions,
    settings: &OrchestratorSettings,
) -> Result<RunOutcome> {
    if algorithms.is_empty() {
        return Err(ScreeningError::InvalidRequest(
            "select at least one algorithm".to_string(),
        ));
    }

    if !options.comparison_mode {
        let run = train_once(trainer, dataset, algorithms, options.use_smote, settings).await?;
        return Ok(RunOutcome::Single(run));
    }

    info!(
        algorithms = algorithms.len(),
        concurrent = settings.concurrent,
        "starting comparison run"
    );
    let (without_smote, with_smote) = if settings.concurrent {
        tokio::try_join!(
            train_once(trainer, dataset, algorithms, false, settings),
            train_once(trainer, dataset, algorithms, true, settings),
        )?
    } else {
        let without = train_once(trainer, dataset, algorithms, false, settings).await?;
        let with = train_once(trainer, dataset, algorithms, true, settings).await?;
        (without, with)
    };

    let analysis = comparison::compare(&without_smote, &with_smote, settings.contingency);
    Ok(RunOutcome::Comparison(ComparisonResult {
        without_smote,
        with_smote,
        improvements: analysis.improvements,
        statistical_tests: analysis.statistical_tests,
    }))
}

async fn train_once(
    trainer: &dyn Trainer,
    dataset: &DatasetHandle,
    algorithms: &[AlgorithmId],
    use_smote: bool,
    settings: &OrchestratorSettings,
) -> Result<TrainingRunResult> {
    let payload = tokio::time::timeout(
        settings.timeout,
        trainer.train(dataset, algorithms, use_smote),
    )
    .await
    .map_err(|_| {
        ScreeningError::trainer(
            format!("training timed out after {}s", settings.timeout.as_secs()),
            String::new(),
        )
    })??;

    let run = normalizer::normalize_run(&payload, algorithms)?;
    info!(
        models = run.len(),
        use_smote,
        test_samples = run.metadata.evaluation_samples(),
        "training run normalized"
    );
    Ok(run)
}

/// The algorithm with the strictly highest F1 score. Ties keep the entry
/// that comes first in catalog order.
pub fn best_algorithm(run: &TrainingRunResult) -> Option<(AlgorithmId, &AlgorithmResult)> {
    let mut best: Option<(AlgorithmId, &AlgorithmResult)> = None;
    for (id, result) in &run.results {
        match best {
            Some((_, current)) if result.metrics.f1_score <= current.metrics.f1_score => {}
            _ => best = Some((*id, result)),
        }
    }
    best
}
