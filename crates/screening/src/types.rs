//! Canonical result types shared by the training, comparison and scoring layers

use crate::catalog::{AlgorithmId, Family};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The fixed metric set, each in [0, 1] after normalization
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
}

impl Metrics {
    pub const NAMES: [&'static str; 5] = ["accuracy", "precision", "recall", "f1_score", "roc_auc"];

    /// Component-wise `self - baseline`; no clamping
    pub fn delta(&self, baseline: &Metrics) -> Metrics {
        Metrics {
            accuracy: self.accuracy - baseline.accuracy,
            precision: self.precision - baseline.precision,
            recall: self.recall - baseline.recall,
            f1_score: self.f1_score - baseline.f1_score,
            roc_auc: self.roc_auc - baseline.roc_auc,
        }
    }

    pub fn clamped(&self) -> Metrics {
        Metrics {
            accuracy: clamp_unit(self.accuracy),
            precision: clamp_unit(self.precision),
            recall: clamp_unit(self.recall),
            f1_score: clamp_unit(self.f1_score),
            roc_auc: clamp_unit(self.roc_auc),
        }
    }

    pub fn values(&self) -> [f64; 5] {
        [
            self.accuracy,
            self.precision,
            self.recall,
            self.f1_score,
            self.roc_auc,
        ]
    }
}

/// Clamp into [0, 1]; NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Cross-validation summary reported by the trainer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvStats {
    pub mean_f1: f64,
    pub std_f1: f64,
}

/// Canonical output for one trained algorithm
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmResult {
    pub name: String,
    pub family: Family,
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<BTreeMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shap_importance: Option<BTreeMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_stats: Option<CvStats>,
}

/// (rows, columns)
pub type Shape = [usize; 2];

/// Trainer-reported run metadata, passed through unmodified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetadata {
    #[serde(alias = "dataset_shape")]
    pub dataset_shape: Shape,
    #[serde(alias = "train_shape")]
    pub train_shape: Shape,
    #[serde(alias = "validation_shape")]
    pub validation_shape: Shape,
    #[serde(alias = "test_shape")]
    pub test_shape: Shape,
    #[serde(alias = "use_smote")]
    pub use_smote: bool,
    #[serde(default, alias = "class_distribution")]
    pub class_distribution: Value,
    #[serde(default, alias = "target_classes", skip_serializing_if = "Option::is_none")]
    pub target_classes: Option<usize>,
    #[serde(default, alias = "algorithms_trained", skip_serializing_if = "Option::is_none")]
    pub algorithms_trained: Option<usize>,
    #[serde(default, alias = "feature_names", skip_serializing_if = "Vec::is_empty")]
    pub feature_names: Vec<String>,
}

impl TrainingMetadata {
    /// Number of held-out samples the statistical test is evaluated over
    pub fn evaluation_samples(&self) -> u64 {
        self.test_shape[0] as u64
    }
}

/// 2x2 agreement table between two classifiers over the same samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contingency {
    #[serde(alias = "both_correct")]
    pub both_correct: u64,
    #[serde(alias = "model1_only_correct")]
    pub model1_only_correct: u64,
    #[serde(alias = "model2_only_correct")]
    pub model2_only_correct: u64,
    #[serde(alias = "both_wrong")]
    pub both_wrong: u64,
}

impl Contingency {
    pub fn total(&self) -> u64 {
        self.both_correct + self.model1_only_correct + self.model2_only_correct + self.both_wrong
    }

    /// Discordant pairs (b + c)
    pub fn discordant(&self) -> u64 {
        self.model1_only_correct + self.model2_only_correct
    }
}

/// Paired significance test between a conventional and a boosting model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McNemarTest {
    pub conventional: AlgorithmId,
    pub boosting: AlgorithmId,
    pub statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    pub contingency: Contingency,
    /// True when the table came from genuine per-sample predictions
    pub reported: bool,
}

/// Key used for statistical test maps: `<convId>_vs_<boostId>`
pub fn pair_key(conventional: AlgorithmId, boosting: AlgorithmId) -> String {
    format!("{}_vs_{}", conventional.as_str(), boosting.as_str())
}

/// One normalized training run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRunResult {
    pub results: BTreeMap<AlgorithmId, AlgorithmResult>,
    pub metadata: TrainingMetadata,
    /// Per-sample contingency tables the trainer reported, keyed like
    /// statistical tests
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub reported_contingency: BTreeMap<String, Contingency>,
}

impl TrainingRunResult {
    pub fn model_ids(&self) -> Vec<AlgorithmId> {
        self.results.keys().copied().collect()
    }

    pub fn get(&self, id: AlgorithmId) -> Option<&AlgorithmResult> {
        self.results.get(&id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Named improvement entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Improvement {
    pub name: String,
    pub improvements: Metrics,
}

/// Output of the comparative analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonAnalysis {
    pub improvements: BTreeMap<AlgorithmId, Improvement>,
    pub statistical_tests: BTreeMap<String, McNemarTest>,
}

/// Dual-run outcome of comparison mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub without_smote: TrainingRunResult,
    pub with_smote: TrainingRunResult,
    pub improvements: BTreeMap<AlgorithmId, Improvement>,
    pub statistical_tests: BTreeMap<String, McNemarTest>,
}

/// What `train` produced, depending on the requested mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunOutcome {
    Single(TrainingRunResult),
    Comparison(ComparisonResult),
}

impl RunOutcome {
    /// Model ids available for prediction. In comparison mode these are the
    /// ids trained with SMOTE.
    pub fn trained_model_ids(&self) -> Vec<AlgorithmId> {
        self.primary_run().model_ids()
    }

    /// The run that drives headline display and prediction
    pub fn primary_run(&self) -> &TrainingRunResult {
        match self {
            RunOutcome::Single(run) => run,
            RunOutcome::Comparison(comparison) => &comparison.with_smote,
        }
    }
}

/// Predicted class for one applicant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    Pass,
    Fail,
}

/// One model's verdict. `probability` is the probability of the predicted
/// class, so a "fail" with probability 0.7 means a pass probability of 0.3.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub algorithm_id: AlgorithmId,
    pub algorithm: &'static str,
    pub prediction: Prediction,
    pub probability: f64,
}

impl PredictionResult {
    /// Build from a pass probability, reporting the own-class probability.
    pub fn from_pass_probability(algorithm_id: AlgorithmId, pass_probability: f64) -> Self {
        let (prediction, probability) = if pass_probability > 0.5 {
            (Prediction::Pass, pass_probability)
        } else {
            (Prediction::Fail, 1.0 - pass_probability)
        };
        Self {
            algorithm_id,
            algorithm: algorithm_id.short_label(),
            prediction,
            probability,
        }
    }

    /// Invert on `prediction` to recover the pass probability
    pub fn pass_probability(&self) -> f64 {
        match self.prediction {
            Prediction::Pass => self.probability,
            Prediction::Fail => 1.0 - self.probability,
        }
    }
}

/// Recommendation banner tier for a champion model's pass probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecisionTier {
    #[serde(rename = "Low Tier")]
    Low,
    #[serde(rename = "Middle Tier")]
    Middle,
    #[serde(rename = "High Tier")]
    High,
}

impl DecisionTier {
    /// `p < 0.20` is Low, `p > 0.60` is High, everything else Middle.
    pub fn from_pass_probability(p: f64) -> Self {
        if p < 0.20 {
            DecisionTier::Low
        } else if p > 0.60 {
            DecisionTier::High
        } else {
            DecisionTier::Middle
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DecisionTier::Low => "Low Tier",
            DecisionTier::Middle => "Middle Tier",
            DecisionTier::High => "High Tier",
        }
    }
}

/// Single-record recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub champion: AlgorithmId,
    pub pass_probability: f64,
    pub tier: DecisionTier,
}

/// One row of a batch prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSlot {
    /// 1-based data row index
    pub row: usize,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Predictions(Vec<PredictionResult>),
    Error(String),
}

impl BatchSlot {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Error(_))
    }

    pub fn predictions(&self) -> Option<&[PredictionResult]> {
        match &self.outcome {
            BatchOutcome::Predictions(p) => Some(p),
            BatchOutcome::Error(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(DecisionTier::from_pass_probability(0.15), DecisionTier::Low);
        assert_ne!(DecisionTier::from_pass_probability(0.20), DecisionTier::Low);
        assert_eq!(DecisionTier::from_pass_probability(0.20), DecisionTier::Middle);
        assert_eq!(DecisionTier::from_pass_probability(0.60), DecisionTier::Middle);
        assert_eq!(DecisionTier::from_pass_probability(0.75), DecisionTier::High);
        assert_eq!(DecisionTier::High.label(), "High Tier");
    }

    #[test]
    fn test_own_class_probability() {
        let fail = PredictionResult::from_pass_probability(AlgorithmId::Svm, 0.3);
        assert_eq!(fail.prediction, Prediction::Fail);
        assert!((fail.probability - 0.7).abs() < 1e-12);
        assert!((fail.pass_probability() - 0.3).abs() < 1e-12);

        let boundary = PredictionResult::from_pass_probability(AlgorithmId::Svm, 0.5);
        assert_eq!(boundary.prediction, Prediction::Fail);
    }

    #[test]
    fn test_metrics_delta_is_unclamped() {
        let with = Metrics {
            accuracy: 0.80,
            precision: 0.70,
            recall: 0.90,
            f1_score: 0.78,
            roc_auc: 0.85,
        };
        let without = Metrics {
            accuracy: 0.85,
            ..with
        };
        let delta = with.delta(&without);
        assert_eq!(delta.accuracy, 0.80 - 0.85);
        assert_eq!(delta.recall, 0.0);
    }

    #[test]
    fn test_contingency_total() {
        let table = Contingency {
            both_correct: 120,
            model1_only_correct: 20,
            model2_only_correct: 30,
            both_wrong: 30,
        };
        assert_eq!(table.total(), 200);
        assert_eq!(table.discordant(), 50);
    }

    #[test]
    fn test_metadata_accepts_snake_case() {
        let meta: TrainingMetadata = serde_json::from_value(serde_json::json!({
            "dataset_shape": [1000, 7],
            "train_shape": [900, 6],
            "validation_shape": [50, 6],
            "test_shape": [50, 6],
            "use_smote": true,
            "class_distribution": {"train": {"0": 450, "1": 450}}
        }))
        .unwrap();
        assert_eq!(meta.evaluation_samples(), 50);
        assert!(meta.use_smote);
    }
}
