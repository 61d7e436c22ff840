//! Screening service: the exposed operations over an explicit session context

use crate::catalog::AlgorithmId;
use crate::comparison;
use crate::config::ScreeningConfig;
use crate::dataset::{self, DatasetHandle, DatasetIssue, DatasetSchema, ValidationReport};
use crate::errors::{Result, ScreeningError};
use crate::features::FeatureVector;
use crate::orchestrator::{self, OrchestratorSettings, TrainingOptions};
use crate::scorer::{self, PredictionScorer};
use crate::trainer::Trainer;
use crate::types::{
    AlgorithmResult, BatchSlot, ComparisonAnalysis, PredictionResult, Recommendation, RunOutcome,
    TrainingRunResult,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Caller-owned state carried between operations: the current algorithm
/// selection and the last training outcome. Starting a new run discards
/// the previous outcome.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub selected_algorithms: Vec<AlgorithmId>,
    pub last_outcome: Option<RunOutcome>,
    /// Models trained outside this session (e.g. saved by an earlier process)
    pub external_models: Vec<AlgorithmId>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for scoring against models that already exist
    pub fn with_trained_models(models: Vec<AlgorithmId>) -> Self {
        Self {
            external_models: models,
            ..Self::default()
        }
    }

    /// Model ids a prediction may reference
    pub fn trained_model_ids(&self) -> Vec<AlgorithmId> {
        match &self.last_outcome {
            Some(outcome) => outcome.trained_model_ids(),
            None => self.external_models.clone(),
        }
    }

    /// Best algorithm of the last run, if any
    pub fn champion(&self) -> Option<AlgorithmId> {
        self.last_outcome
            .as_ref()
            .and_then(|outcome| orchestrator::best_algorithm(outcome.primary_run()))
            .map(|(id, _)| id)
    }
}

/// Stateless entry point; all per-session state lives in `SessionContext`.
pub struct ScreeningService {
    schema: DatasetSchema,
    settings: OrchestratorSettings,
    trainer: Arc<dyn Trainer>,
    scorer: PredictionScorer,
}

impl ScreeningService {
    pub fn new(config: &ScreeningConfig) -> Self {
        for warning in config.validate() {
            warn!("{warning}");
        }
        Self {
            schema: config.dataset_schema(),
            settings: config.orchestrator_settings(),
            trainer: config.build_trainer(),
            scorer: config.build_scorer(),
        }
    }

    /// Service from explicit parts
    pub fn with_parts(
        schema: DatasetSchema,
        settings: OrchestratorSettings,
        trainer: Arc<dyn Trainer>,
        scorer: PredictionScorer,
    ) -> Self {
        Self {
            schema,
            settings,
            trainer,
            scorer,
        }
    }

    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    /// Check an upload and report every problem found
    pub fn validate_dataset(&self, text: &str) -> Result<ValidationReport> {
        let report = dataset::validate(text, &self.schema)?;
        info!(
            rows = report.row_count,
            errors = report.errors.len(),
            "dataset validated"
        );
        Ok(report)
    }

    /// Validate an upload and turn it into a trainable handle
    pub fn load_dataset(&self, text: &str) -> Result<DatasetHandle> {
        DatasetHandle::from_text(text, &self.schema)
    }

    /// Train the selection and record the outcome in `ctx`.
    pub async fn train(
        &self,
        ctx: &mut SessionContext,
        dataset: &DatasetHandle,
        algorithms: &[AlgorithmId],
        options: TrainingOptions,
    ) -> Result<RunOutcome> {
        ctx.selected_algorithms = algorithms.to_vec();
        ctx.last_outcome = None;

        let outcome =
            orchestrator::run(self.trainer.as_ref(), dataset, algorithms, options, &self.settings)
                .await?;
        ctx.last_outcome = Some(outcome.clone());
        Ok(outcome)
    }

    pub fn compare(
        &self,
        without_smote: &TrainingRunResult,
        with_smote: &TrainingRunResult,
    ) -> ComparisonAnalysis {
        comparison::compare(without_smote, with_smote, self.settings.contingency)
    }

    pub fn best_algorithm(run: &TrainingRunResult) -> Option<(AlgorithmId, &AlgorithmResult)> {
        orchestrator::best_algorithm(run)
    }

    /// Score one applicant against the requested models that `ctx` knows.
    pub async fn predict(
        &self,
        ctx: &SessionContext,
        features: &FeatureVector,
        models: &[AlgorithmId],
    ) -> Result<Vec<PredictionResult>> {
        let known = known_models(ctx, models)?;
        self.scorer.score(features, &known).await
    }

    /// Row-wise `predict`; failing rows become error slots.
    pub async fn predict_batch(
        &self,
        ctx: &SessionContext,
        records: &[std::result::Result<FeatureVector, Vec<DatasetIssue>>],
        models: &[AlgorithmId],
    ) -> Result<Vec<BatchSlot>> {
        let known = known_models(ctx, models)?;
        self.scorer.score_batch(records, &known).await
    }

    /// Recommendation for `predictions`, championed by the last run's best
    /// algorithm when it was scored
    pub fn recommend(
        &self,
        ctx: &SessionContext,
        predictions: &[PredictionResult],
    ) -> Option<Recommendation> {
        scorer::recommend(predictions, ctx.champion())
    }
}

fn known_models(ctx: &SessionContext, requested: &[AlgorithmId]) -> Result<Vec<AlgorithmId>> {
    if requested.is_empty() {
        return Err(ScreeningError::NoTrainedModels);
    }
    let trained = ctx.trained_model_ids();
    let (known, unknown): (Vec<AlgorithmId>, Vec<AlgorithmId>) =
        requested.iter().copied().partition(|id| trained.contains(id));
    if !unknown.is_empty() {
        warn!(?unknown, "ignoring models that were not trained in this session");
    }
    if known.is_empty() {
        return Err(ScreeningError::NoTrainedModels);
    }
    Ok(known)
}
