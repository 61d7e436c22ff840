//! Trainer backends
//!
//! A trainer takes a validated dataset and a list of algorithm ids and
//! returns a raw JSON payload: one entry per algorithm keyed by id, plus a
//! `metadata` sibling. Normalization happens in the orchestrator.

use crate::catalog::AlgorithmId;
use crate::dataset::DatasetHandle;
use crate::errors::{Result, ScreeningError};
use crate::process::{self, CommandSpec};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use std::io::Write;
use tracing::{debug, info, warn};

/// Feature columns the trainers report importance over
pub const FEATURE_NAMES: [&str; 6] = [
    "age",
    "gender",
    "grades",
    "majoring",
    "logical_test_score",
    "tech_interview_grades",
];

/// Something that can fit the selected algorithms on a dataset
#[async_trait]
pub trait Trainer: Send + Sync {
    /// Train `algorithms` on `dataset`, with or without SMOTE rebalancing of
    /// the training split, and return the raw payload.
    async fn train(
        &self,
        dataset: &DatasetHandle,
        algorithms: &[AlgorithmId],
        use_smote: bool,
    ) -> Result<Value>;
}

/// Runs an external training program.
///
/// The dataset is written to a temporary CSV which is removed whether or not
/// training succeeds. The program receives
/// `--data_path <csv> --target_column <col> --algorithms a,b [--use_smote]`
/// and must print a single JSON document on stdout.
#[derive(Debug, Clone)]
pub struct ExternalProcessTrainer {
    command: CommandSpec,
    target_column: String,
}

impl ExternalProcessTrainer {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            target_column: "class".to_string(),
        }
    }

    pub fn with_target_column(mut self, column: impl Into<String>) -> Self {
        self.target_column = column.into();
        self
    }

    fn arguments(
        &self,
        data_path: &str,
        algorithms: &[AlgorithmId],
        use_smote: bool,
    ) -> Vec<String> {
        let ids: Vec<&str> = algorithms.iter().map(AlgorithmId::as_str).collect();
        let mut args = vec![
            "--data_path".to_string(),
            data_path.to_string(),
            "--target_column".to_string(),
            self.target_column.clone(),
            "--algorithms".to_string(),
            ids.join(","),
        ];
        if use_smote {
            args.push("--use_smote".to_string());
        }
        args
    }
}

#[async_trait]
impl Trainer for ExternalProcessTrainer {
    async fn train(
        &self,
        dataset: &DatasetHandle,
        algorithms: &[AlgorithmId],
        use_smote: bool,
    ) -> Result<Value> {
        let mut file = tempfile::Builder::new()
            .prefix("screening-")
            .suffix(".csv")
            .tempfile()?;
        file.write_all(dataset.text().as_bytes())?;
        file.flush()?;

        let data_path = file.path().to_string_lossy().into_owned();
        let args = self.arguments(&data_path, algorithms, use_smote);
        info!(
            program = %self.command.program,
            algorithms = algorithms.len(),
            use_smote,
            "starting external trainer"
        );

        let output = process::run(&self.command, &args).await.map_err(|e| {
            ScreeningError::trainer(
                format!("failed to start '{}'", self.command.program),
                e.to_string(),
            )
        })?;
        // `file` drops here on every path, removing the temporary CSV.
        drop(file);

        if !output.success {
            let message = output
                .reported_error()
                .unwrap_or_else(|| format!("trainer exited with {}", output.status()));
            return Err(ScreeningError::trainer(message, output.diagnostics()));
        }

        let payload: Value = serde_json::from_str(output.stdout.trim()).map_err(|e| {
            ScreeningError::trainer(
                format!("trainer output is not JSON: {e}"),
                output.diagnostics(),
            )
        })?;

        if let Some(message) = process::error_message(&payload) {
            return Err(ScreeningError::trainer(message, output.diagnostics()));
        }

        if !output.stderr.trim().is_empty() {
            debug!(stderr = %output.stderr.trim(), "trainer diagnostics");
        }
        Ok(payload)
    }
}

/// Deterministic stand-in trainer that produces plausible metrics without
/// fitting anything.
///
/// Each algorithm starts from a fixed baseline. A SMOTE run adds a small
/// signed jitter per metric, clamped into [0.5, 0.99]. Importance maps are
/// random but biased towards the test scores and already normalized.
/// Metadata uses a 90/5/5 split of the dataset's row count.
#[derive(Debug, Clone, Default)]
pub struct SyntheticTrainer {
    seed: Option<u64>,
}

impl SyntheticTrainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    fn rng(&self, use_smote: bool) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ u64::from(use_smote)),
            None => StdRng::from_entropy(),
        }
    }

    fn baseline(id: AlgorithmId) -> [f64; 5] {
        match id {
            AlgorithmId::Logistic => [0.85, 0.82, 0.88, 0.85, 0.87],
            AlgorithmId::DecisionTree => [0.78, 0.76, 0.82, 0.79, 0.81],
            AlgorithmId::Knn => [0.80, 0.78, 0.84, 0.81, 0.83],
            AlgorithmId::Svm => [0.83, 0.81, 0.86, 0.83, 0.85],
            AlgorithmId::Adaboost => [0.87, 0.85, 0.89, 0.87, 0.89],
            AlgorithmId::Xgboost => [0.89, 0.87, 0.91, 0.89, 0.91],
        }
    }

    fn hyperparameter_grid(id: AlgorithmId) -> [Value; 3] {
        match id {
            AlgorithmId::Logistic => [
                json!({"C": 1, "solver": "lbfgs"}),
                json!({"C": 10, "solver": "liblinear"}),
                json!({"C": 100, "solver": "lbfgs"}),
            ],
            AlgorithmId::DecisionTree => [
                json!({"max_depth": 5, "min_samples_split": 2, "min_samples_leaf": 1}),
                json!({"max_depth": 7, "min_samples_split": 5, "min_samples_leaf": 2}),
                json!({"max_depth": 10, "min_samples_split": 10, "min_samples_leaf": 4}),
            ],
            AlgorithmId::Knn => [
                json!({"n_neighbors": 5, "weights": "uniform", "metric": "euclidean"}),
                json!({"n_neighbors": 7, "weights": "distance", "metric": "manhattan"}),
                json!({"n_neighbors": 9, "weights": "uniform", "metric": "euclidean"}),
            ],
            AlgorithmId::Svm => [
                json!({"C": 1, "kernel": "rbf", "gamma": "scale"}),
                json!({"C": 10, "kernel": "linear", "gamma": "auto"}),
                json!({"C": 100, "kernel": "rbf", "gamma": "scale"}),
            ],
            AlgorithmId::Adaboost => [
                json!({"n_estimators": 100, "learning_rate": 0.1}),
                json!({"n_estimators": 200, "learning_rate": 0.01}),
                json!({"n_estimators": 50, "learning_rate": 1.0}),
            ],
            AlgorithmId::Xgboost => [
                json!({"n_estimators": 200, "max_depth": 4, "learning_rate": 0.1}),
                json!({"n_estimators": 300, "max_depth": 5, "learning_rate": 0.01}),
                json!({"n_estimators": 100, "max_depth": 6, "learning_rate": 0.2}),
            ],
        }
    }

    fn smote_jitter(rng: &mut StdRng) -> [f64; 5] {
        [
            (rng.gen::<f64>() - 0.5) * 0.02,
            (rng.gen::<f64>() - 0.6) * 0.03,
            (rng.gen::<f64>() + 0.4) * 0.04,
            (rng.gen::<f64>() - 0.2) * 0.025,
            (rng.gen::<f64>() - 0.1) * 0.02,
        ]
    }

    /// Random weights, test-score features drawn from `strong`, the rest
    /// from `weak`, normalized to sum to 1.
    fn importance(rng: &mut StdRng, strong: (f64, f64), weak: (f64, f64)) -> Map<String, Value> {
        let weights: Vec<(&str, f64)> = FEATURE_NAMES
            .iter()
            .map(|&feature| {
                let (base, spread) =
                    if feature == "logical_test_score" || feature == "tech_interview_grades" {
                        strong
                    } else {
                        weak
                    };
                (feature, base + rng.gen::<f64>() * spread)
            })
            .collect();
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        weights
            .into_iter()
            .map(|(feature, w)| (feature.to_string(), json!(w / total)))
            .collect()
    }

    fn metadata(dataset: &DatasetHandle, algorithms: usize, use_smote: bool) -> Value {
        let rows = dataset.row_count;
        let features = dataset.feature_count();
        let held_out = ((rows as f64 * 0.05).round() as usize).max(1);
        let train = rows.saturating_sub(2 * held_out);

        let mut train_distribution = dataset.class_counts.clone();
        if use_smote {
            let majority = train_distribution.values().copied().max().unwrap_or(0);
            for count in train_distribution.values_mut() {
                *count = majority;
            }
        }

        json!({
            "dataset_shape": [rows, features + 1],
            "train_shape": [train, features],
            "validation_shape": [held_out, features],
            "test_shape": [held_out, features],
            "use_smote": use_smote,
            "target_classes": dataset.class_counts.len(),
            "algorithms_trained": algorithms,
            "feature_names": FEATURE_NAMES,
            "class_distribution": {
                "dataset": dataset.class_counts,
                "train": train_distribution,
            },
        })
    }
}

#[async_trait]
impl Trainer for SyntheticTrainer {
    async fn train(
        &self,
        dataset: &DatasetHandle,
        algorithms: &[AlgorithmId],
        use_smote: bool,
    ) -> Result<Value> {
        if algorithms.is_empty() {
            warn!("synthetic trainer called without algorithms");
        }
        let mut rng = self.rng(use_smote);
        let mut payload = Map::new();

        for &id in algorithms {
            let base = Self::baseline(id);
            let jitter = if use_smote {
                Self::smote_jitter(&mut rng)
            } else {
                [0.0; 5]
            };
            let metric = |i: usize| (base[i] + jitter[i]).clamp(0.5, 0.99);

            let grid = Self::hyperparameter_grid(id);
            let best_params = grid[rng.gen_range(0..grid.len())].clone();
            let validation_score = (base[3] - 0.02 + rng.gen::<f64>() * 0.04).clamp(0.5, 0.95);
            let feature_importance = Self::importance(&mut rng, (0.15, 0.25), (0.05, 0.15));
            let shap_importance = Self::importance(&mut rng, (0.12, 0.18), (0.08, 0.12));
            let mean_f1 = (metric(3) - 0.01 + rng.gen::<f64>() * 0.02).clamp(0.5, 0.99);
            let std_f1 = 0.01 + rng.gen::<f64>() * 0.02;

            payload.insert(
                id.as_str().to_string(),
                json!({
                    "name": id.display_name(),
                    "type": id.family().as_str(),
                    "metrics": {
                        "accuracy": metric(0),
                        "precision": metric(1),
                        "recall": metric(2),
                        "f1_score": metric(3),
                        "roc_auc": metric(4),
                    },
                    "best_params": best_params,
                    "validation_score": validation_score,
                    "feature_importance": feature_importance,
                    "shap_importance": shap_importance,
                    "cv_stats": {"mean_f1": mean_f1, "std_f1": std_f1},
                }),
            );
        }

        payload.insert(
            "metadata".to_string(),
            Self::metadata(dataset, algorithms.len(), use_smote),
        );
        debug!(algorithms = algorithms.len(), use_smote, "synthetic training finished");
        Ok(Value::Object(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetSchema;
    use crate::normalizer::normalize_run;

    fn dataset() -> DatasetHandle {
        let text = "age,gender,grades,majoring,experience,logical_test_score,tech_interview_grades,class\n\
                    25,L,S1,IT,yes,85,78,pass\n\
                    31,P,D3,Non IT,no,55,60,failed\n\
                    22,L,SMA,IT,no,70,72,pass\n";
        DatasetHandle::from_text(text, &DatasetSchema::default()).unwrap()
    }

    #[tokio::test]
    async fn test_synthetic_payload_normalizes() {
        let ids = [AlgorithmId::Svm, AlgorithmId::Adaboost];
        let payload = SyntheticTrainer::with_seed(7)
            .train(&dataset(), &ids, true)
            .await
            .unwrap();
        let run = normalize_run(&payload, &ids).unwrap();
        assert_eq!(run.model_ids(), ids.to_vec());
        assert!(run.metadata.use_smote);
        for result in run.results.values() {
            for value in result.metrics.values() {
                assert!((0.5..=0.99).contains(&value));
            }
        }
    }

    #[tokio::test]
    async fn test_synthetic_baseline_without_smote() {
        let payload = SyntheticTrainer::with_seed(1)
            .train(&dataset(), &[AlgorithmId::Xgboost], false)
            .await
            .unwrap();
        assert_eq!(payload["xgboost"]["metrics"]["f1_score"], json!(0.89));
        assert_eq!(payload["metadata"]["test_shape"], json!([1, 7]));
    }

    #[tokio::test]
    async fn test_seeded_runs_repeat() {
        let trainer = SyntheticTrainer::with_seed(42);
        let ids = [AlgorithmId::Knn];
        let a = trainer.train(&dataset(), &ids, true).await.unwrap();
        let b = trainer.train(&dataset(), &ids, true).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_external_arguments() {
        let trainer = ExternalProcessTrainer::new(CommandSpec::new("python3"));
        let args = trainer.arguments(
            "/tmp/data.csv",
            &[AlgorithmId::Logistic, AlgorithmId::Xgboost],
            true,
        );
        assert_eq!(
            args,
            vec![
                "--data_path",
                "/tmp/data.csv",
                "--target_column",
                "class",
                "--algorithms",
                "logistic,xgboost",
                "--use_smote"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_trainer_failure() {
        let trainer = ExternalProcessTrainer::new(CommandSpec::new(
            "/nonexistent/screening-trainer-binary",
        ));
        let err = trainer
            .train(&dataset(), &[AlgorithmId::Logistic], false)
            .await
            .unwrap_err();
        assert!(err.is_trainer_failure());
    }
}
