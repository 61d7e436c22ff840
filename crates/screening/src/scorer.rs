//! Prediction scoring
//!
//! Without a live predictor each model's verdict comes from a fixed rule
//! ladder over the applicant's features, perturbed per model and clamped
//! into [0.1, 0.9]. An external predictor, when configured, replaces the
//! ladder entirely.

use crate::catalog::AlgorithmId;
use crate::dataset::DatasetIssue;
use crate::errors::{Result, ScreeningError};
use crate::features::FeatureVector;
use crate::process::{self, CommandSpec};
use crate::types::{
    clamp_unit, BatchOutcome, BatchSlot, DecisionTier, Prediction, PredictionResult,
    Recommendation,
};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lower bound of a perturbed pass probability
pub const MIN_PASS_PROBABILITY: f64 = 0.1;
/// Upper bound of a perturbed pass probability
pub const MAX_PASS_PROBABILITY: f64 = 0.9;

/// Rule-ladder pass probability before any per-model perturbation.
///
/// Starts at 0.5; logical score adds 0.2 (>= 80), 0.1 (>= 60) or removes
/// 0.2 (< 40); interview score adds 0.2 (>= 80), 0.1 (>= 65) or removes 0.2
/// (< 50); experience adds 0.15, an IT major 0.1, age 25..=35 adds 0.05.
pub fn base_pass_probability(features: &FeatureVector) -> f64 {
    let mut p = 0.5;

    let logical = features.logical_test_score;
    if logical >= 80.0 {
        p += 0.2;
    } else if logical >= 60.0 {
        p += 0.1;
    } else if logical < 40.0 {
        p -= 0.2;
    }

    let interview = features.tech_interview_grades;
    if interview >= 80.0 {
        p += 0.2;
    } else if interview >= 65.0 {
        p += 0.1;
    } else if interview < 50.0 {
        p -= 0.2;
    }

    if features.has_experience() {
        p += 0.15;
    }
    if features.is_it_background() {
        p += 0.1;
    }
    if (25.0..=35.0).contains(&features.age) {
        p += 0.05;
    }
    p
}

/// Produces one verdict per requested model
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(
        &self,
        features: &FeatureVector,
        models: &[AlgorithmId],
    ) -> Result<Vec<PredictionResult>>;
}

/// Rule ladder plus a uniform per-model perturbation of
/// `±AlgorithmId::perturbation_amplitude`.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedScorer {
    seed: Option<u64>,
}

impl RuleBasedScorer {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    /// Synchronous scoring; a fixed seed yields the same perturbations for the
    /// same model list.
    pub fn score(&self, features: &FeatureVector, models: &[AlgorithmId]) -> Vec<PredictionResult> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let base = base_pass_probability(features);

        models
            .iter()
            .map(|&id| {
                let amplitude = id.perturbation_amplitude();
                let noise = rng.gen_range(-amplitude..=amplitude);
                let p = (base + noise).clamp(MIN_PASS_PROBABILITY, MAX_PASS_PROBABILITY);
                PredictionResult::from_pass_probability(id, p)
            })
            .collect()
    }
}

#[async_trait]
impl Predictor for RuleBasedScorer {
    async fn predict(
        &self,
        features: &FeatureVector,
        models: &[AlgorithmId],
    ) -> Result<Vec<PredictionResult>> {
        Ok(self.score(features, models))
    }
}

/// Runs an external prediction program against saved models.
///
/// Invoked as `--participant <json> --models a,b --models_dir <dir>`; stdout
/// must be `{"predictions": {id: {prediction, confidence}}}`. The reported
/// confidence is the probability of the predicted class.
#[derive(Debug, Clone)]
pub struct ExternalProcessPredictor {
    command: CommandSpec,
    models_dir: String,
}

impl ExternalProcessPredictor {
    pub fn new(command: CommandSpec, models_dir: impl Into<String>) -> Self {
        Self {
            command,
            models_dir: models_dir.into(),
        }
    }

    fn parse_output(stdout: &str, models: &[AlgorithmId]) -> Result<Vec<PredictionResult>> {
        let payload: Value = serde_json::from_str(stdout.trim())
            .map_err(|e| ScreeningError::PredictorFailure(format!("output is not JSON: {e}")))?;
        if let Some(message) = process::error_message(&payload) {
            return Err(ScreeningError::PredictorFailure(message));
        }
        let predictions = payload
            .get("predictions")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ScreeningError::PredictorFailure("output has no predictions map".into())
            })?;

        models
            .iter()
            .map(|&id| {
                let entry = predictions.get(id.as_str()).ok_or_else(|| {
                    ScreeningError::PredictorFailure(format!("no prediction for '{id}'"))
                })?;
                if let Some(message) = process::error_message(entry) {
                    return Err(ScreeningError::PredictorFailure(format!("{id}: {message}")));
                }
                let prediction = match entry.get("prediction").and_then(Value::as_str) {
                    Some("pass") => Prediction::Pass,
                    Some("fail") => Prediction::Fail,
                    other => {
                        return Err(ScreeningError::PredictorFailure(format!(
                            "{id}: unrecognized prediction {other:?}"
                        )))
                    }
                };
                let probability = entry
                    .get("confidence")
                    .or_else(|| entry.get("probability"))
                    .and_then(Value::as_f64)
                    .ok_or_else(|| {
                        ScreeningError::PredictorFailure(format!("{id}: missing confidence"))
                    })?;
                Ok(PredictionResult {
                    algorithm_id: id,
                    algorithm: id.short_label(),
                    prediction,
                    probability: clamp_unit(probability),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Predictor for ExternalProcessPredictor {
    async fn predict(
        &self,
        features: &FeatureVector,
        models: &[AlgorithmId],
    ) -> Result<Vec<PredictionResult>> {
        let ids: Vec<&str> = models.iter().map(AlgorithmId::as_str).collect();
        let args = vec![
            "--participant".to_string(),
            serde_json::to_string(features)?,
            "--models".to_string(),
            ids.join(","),
            "--models_dir".to_string(),
            self.models_dir.clone(),
        ];

        let output = process::run(&self.command, &args).await.map_err(|e| {
            ScreeningError::PredictorFailure(format!(
                "failed to start '{}': {e}",
                self.command.program
            ))
        })?;
        if !output.success {
            let message = match output.reported_error() {
                Some(message) => message,
                None => format!(
                    "predictor exited with {}: {}",
                    output.status(),
                    output.diagnostics()
                ),
            };
            return Err(ScreeningError::PredictorFailure(message));
        }
        Self::parse_output(&output.stdout, models)
    }
}

/// Entry point for single and batch scoring
#[derive(Clone)]
pub struct PredictionScorer {
    external: Option<Arc<dyn Predictor>>,
    fallback: RuleBasedScorer,
    timeout: Duration,
}

impl PredictionScorer {
    /// Scorer backed by the rule ladder only
    pub fn rule_based(seed: Option<u64>) -> Self {
        Self {
            external: None,
            fallback: RuleBasedScorer::new(seed),
            timeout: Duration::from_secs(60),
        }
    }

    /// Route every request to `predictor` instead of the rule ladder
    pub fn with_predictor(mut self, predictor: Arc<dyn Predictor>, timeout: Duration) -> Self {
        self.external = Some(predictor);
        self.timeout = timeout;
        self
    }

    /// Score one applicant against `models`.
    pub async fn score(
        &self,
        features: &FeatureVector,
        models: &[AlgorithmId],
    ) -> Result<Vec<PredictionResult>> {
        if models.is_empty() {
            return Err(ScreeningError::NoTrainedModels);
        }
        features.check().map_err(ScreeningError::ValidationFailed)?;

        let mut unique = Vec::with_capacity(models.len());
        for id in models {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }

        match &self.external {
            Some(predictor) => {
                debug!(models = unique.len(), "scoring with external predictor");
                tokio::time::timeout(self.timeout, predictor.predict(features, &unique))
                    .await
                    .map_err(|_| {
                        ScreeningError::PredictorFailure(format!(
                            "prediction timed out after {}s",
                            self.timeout.as_secs()
                        ))
                    })?
            }
            None => {
                debug!(models = unique.len(), "scoring with rule ladder");
                Ok(self.fallback.score(features, &unique))
            }
        }
    }

    /// Score many applicants. Rows that failed to parse, or fail scoring,
    /// become error slots; the batch itself only fails when `models` is empty.
    pub async fn score_batch(
        &self,
        records: &[std::result::Result<FeatureVector, Vec<DatasetIssue>>],
        models: &[AlgorithmId],
    ) -> Result<Vec<BatchSlot>> {
        if models.is_empty() {
            return Err(ScreeningError::NoTrainedModels);
        }

        let mut slots = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            let outcome = match record {
                Ok(features) => match self.score(features, models).await {
                    Ok(predictions) => BatchOutcome::Predictions(predictions),
                    Err(e) => BatchOutcome::Error(e.to_string()),
                },
                Err(issues) => BatchOutcome::Error(
                    issues
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; "),
                ),
            };
            slots.push(BatchSlot {
                row: idx + 1,
                outcome,
            });
        }

        let failed = slots.iter().filter(|slot| slot.is_error()).count();
        if failed > 0 {
            warn!(rows = slots.len(), failed, "batch scoring finished with row errors");
        } else {
            info!(rows = slots.len(), "batch scoring finished");
        }
        Ok(slots)
    }
}

impl std::fmt::Debug for PredictionScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionScorer")
            .field("external", &self.external.is_some())
            .field("fallback", &self.fallback)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Recommendation banner for `champion`, or for the first prediction when
/// the champion is absent or not among `predictions`.
pub fn recommend(
    predictions: &[PredictionResult],
    champion: Option<AlgorithmId>,
) -> Option<Recommendation> {
    let chosen = champion
        .and_then(|id| predictions.iter().find(|p| p.algorithm_id == id))
        .or_else(|| predictions.first())?;
    let pass_probability = chosen.pass_probability();
    Some(Recommendation {
        champion: chosen.algorithm_id,
        pass_probability,
        tier: DecisionTier::from_pass_probability(pass_probability),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Experience, Gender, Grade, Majoring};

    fn applicant(
        logical: f64,
        interview: f64,
        experience: bool,
        it: bool,
        age: f64,
    ) -> FeatureVector {
        FeatureVector {
            age,
            gender: Gender::Male,
            grades: Grade::S1,
            majoring: if it { Majoring::It } else { Majoring::NonIt },
            experience: Some(if experience { Experience::Yes } else { Experience::No }),
            tech_interview_result: None,
            logical_test_score: logical,
            tech_interview_grades: interview,
        }
    }

    #[test]
    fn test_rule_ladder_strong_applicant() {
        let p = base_pass_probability(&applicant(85.0, 82.0, true, true, 28.0));
        assert!((p - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_rule_ladder_neutral_band() {
        let p = base_pass_probability(&applicant(50.0, 55.0, false, false, 40.0));
        assert!((p - 0.5).abs() < 1e-12);
        let p = base_pass_probability(&applicant(30.0, 40.0, false, false, 20.0));
        assert!((p - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_strong_applicant_clamped_to_upper_bound() {
        let results = RuleBasedScorer::new(Some(5))
            .score(&applicant(85.0, 82.0, true, true, 28.0), &AlgorithmId::ALL);
        assert_eq!(results.len(), 6);
        for result in &results {
            assert_eq!(result.prediction, Prediction::Pass);
            assert_eq!(result.probability, MAX_PASS_PROBABILITY);
        }
    }

    #[test]
    fn test_weak_applicant_reports_own_class_probability() {
        let results = RuleBasedScorer::new(Some(5))
            .score(&applicant(30.0, 40.0, false, false, 20.0), &[AlgorithmId::Xgboost]);
        assert_eq!(results[0].prediction, Prediction::Fail);
        // Base 0.1 plus up to +0.025 of noise, floored at 0.1.
        assert!(results[0].probability > 0.875 - 1e-12);
        assert!(results[0].probability <= 0.9 + 1e-12);
        assert_eq!(results[0].algorithm, "XGBoost");
    }

    #[test]
    fn test_perturbation_within_amplitude() {
        let features = applicant(70.0, 70.0, false, false, 40.0);
        let base = base_pass_probability(&features);
        let results = RuleBasedScorer::new(None).score(&features, &AlgorithmId::ALL);
        for result in results {
            let amplitude = result.algorithm_id.perturbation_amplitude();
            assert!((result.pass_probability() - base).abs() <= amplitude + 1e-12);
        }
    }

    #[tokio::test]
    async fn test_empty_models_rejected() {
        let scorer = PredictionScorer::rule_based(Some(1));
        let err = scorer
            .score(&applicant(70.0, 70.0, true, true, 30.0), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ScreeningError::NoTrainedModels));
    }

    struct StalledPredictor;

    #[async_trait]
    impl Predictor for StalledPredictor {
        async fn predict(
            &self,
            _features: &FeatureVector,
            _models: &[AlgorithmId],
        ) -> Result<Vec<PredictionResult>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_predictor_times_out() {
        let scorer = PredictionScorer::rule_based(Some(1))
            .with_predictor(Arc::new(StalledPredictor), Duration::from_secs(2));
        let err = scorer
            .score(&applicant(70.0, 70.0, true, true, 30.0), &[AlgorithmId::Knn])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "predictor failure: prediction timed out after 2s"
        );
    }

    #[tokio::test]
    async fn test_out_of_range_features_rejected() {
        let scorer = PredictionScorer::rule_based(Some(1));
        let err = scorer
            .score(&applicant(70.0, 70.0, true, true, 12.0), &[AlgorithmId::Svm])
            .await
            .unwrap_err();
        assert!(matches!(err, ScreeningError::ValidationFailed(ref issues) if issues.len() == 1));
    }

    #[tokio::test]
    async fn test_batch_isolates_row_errors() {
        let scorer = PredictionScorer::rule_based(Some(1));
        let records = vec![
            Ok(applicant(70.0, 70.0, true, true, 30.0)),
            Ok(applicant(170.0, 70.0, true, true, 30.0)),
            Err(vec![DatasetIssue::invalid_field("age", "age is required".into())]),
        ];
        let slots = scorer
            .score_batch(&records, &[AlgorithmId::Logistic, AlgorithmId::Adaboost])
            .await
            .unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].predictions().map(<[_]>::len), Some(2));
        assert!(slots[1].is_error());
        assert!(slots[2].is_error());
        assert_eq!(slots[2].row, 3);
    }

    #[test]
    fn test_recommend_prefers_champion() {
        let predictions = vec![
            PredictionResult::from_pass_probability(AlgorithmId::Logistic, 0.15),
            PredictionResult::from_pass_probability(AlgorithmId::Xgboost, 0.75),
        ];
        let rec = recommend(&predictions, Some(AlgorithmId::Xgboost)).unwrap();
        assert_eq!(rec.tier, DecisionTier::High);

        let rec = recommend(&predictions, Some(AlgorithmId::Svm)).unwrap();
        assert_eq!(rec.champion, AlgorithmId::Logistic);
        assert_eq!(rec.tier, DecisionTier::Low);

        assert!(recommend(&[], None).is_none());
    }

    #[test]
    fn test_external_output_parsing() {
        let stdout = r#"{"predictions": {"svm": {"prediction": "fail", "confidence": 0.7},
                          "adaboost": {"prediction": "pass", "confidence": 0.8}}}"#;
        let models = [AlgorithmId::Svm, AlgorithmId::Adaboost];
        let results = ExternalProcessPredictor::parse_output(stdout, &models).unwrap();
        assert!((results[0].pass_probability() - 0.3).abs() < 1e-12);
        assert_eq!(results[1].prediction, Prediction::Pass);

        let failed = r#"{"predictions": {"svm": {"error": "Model file not found"}}}"#;
        assert!(matches!(
            ExternalProcessPredictor::parse_output(failed, &[AlgorithmId::Svm]),
            Err(ScreeningError::PredictorFailure(_))
        ));
    }
}
