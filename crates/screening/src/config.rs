//! Configuration for the screening engine
//!
//! Loaded from TOML, with `SCREENING_*` environment variables applied on top.

use crate::comparison::ContingencySource;
use crate::dataset::{DatasetSchema, SchemaVariant, PREVIEW_ROWS};
use crate::errors::{Result, ScreeningError};
use crate::orchestrator::OrchestratorSettings;
use crate::process::CommandSpec;
use crate::scorer::{ExternalProcessPredictor, PredictionScorer};
use crate::trainer::{ExternalProcessTrainer, SyntheticTrainer, Trainer};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const ENV_PREFIX: &str = "SCREENING_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub validation: ValidationConfig,
    pub trainer: TrainerConfig,
    pub predictor: PredictorConfig,
    pub comparison: ComparisonConfig,
    pub scoring: ScoringConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub schema_variant: SchemaVariant,
    /// Data rows checked per upload; 0 checks all rows
    pub max_rows_checked: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schema_variant: SchemaVariant::default(),
            max_rows_checked: PREVIEW_ROWS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// External training program. Empty selects the synthetic trainer.
    pub program: String,
    pub args: Vec<String>,
    pub target_column: String,
    pub timeout_secs: u64,
    pub synthetic_seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            target_column: "class".to_string(),
            timeout_secs: 300,
            synthetic_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// External prediction program. Empty selects the rule ladder.
    pub program: String,
    pub args: Vec<String>,
    pub models_dir: String,
    pub timeout_secs: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            models_dir: "models".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    pub concurrent: bool,
    pub contingency: ContingencySource,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            concurrent: true,
            contingency: ContingencySource::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ScreeningConfig {
    /// Load from a TOML file, then apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScreeningError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let mut config: ScreeningConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(format!("{ENV_PREFIX}{key}")).ok());
    }

    /// Apply overrides from `lookup`, keyed without the `SCREENING_` prefix.
    /// Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(value) = get("SCHEMA_VARIANT") {
            match value.to_lowercase().as_str() {
                "experience" => self.validation.schema_variant = SchemaVariant::Experience,
                "interview_result" => {
                    self.validation.schema_variant = SchemaVariant::InterviewResult
                }
                _ => {}
            }
        }
        if let Some(parsed) = get("MAX_ROWS_CHECKED").and_then(|v| v.parse().ok()) {
            self.validation.max_rows_checked = parsed;
        }

        if let Some(value) = get("TRAINER_PROGRAM") {
            self.trainer.program = value;
        }
        if let Some(value) = get("TARGET_COLUMN") {
            self.trainer.target_column = value;
        }
        if let Some(parsed) = get("TRAINER_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.trainer.timeout_secs = parsed;
        }
        if let Some(parsed) = get("SYNTHETIC_SEED").and_then(|v| v.parse().ok()) {
            self.trainer.synthetic_seed = Some(parsed);
        }

        if let Some(value) = get("PREDICTOR_PROGRAM") {
            self.predictor.program = value;
        }
        if let Some(value) = get("MODELS_DIR") {
            self.predictor.models_dir = value;
        }
        if let Some(parsed) = get("PREDICTOR_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.predictor.timeout_secs = parsed;
        }

        if let Some(parsed) = get("CONCURRENT").and_then(|v| parse_bool(&v)) {
            self.comparison.concurrent = parsed;
        }
        if let Some(value) = get("CONTINGENCY") {
            match value.to_lowercase().as_str() {
                "estimated" => self.comparison.contingency = ContingencySource::Estimated,
                "reported_or_estimated" => {
                    self.comparison.contingency = ContingencySource::ReportedOrEstimated
                }
                _ => {}
            }
        }

        if let Some(parsed) = get("SCORING_SEED").and_then(|v| v.parse().ok()) {
            self.scoring.seed = Some(parsed);
        }
        if let Some(value) = get("LOG_LEVEL") {
            self.logging.level = value;
        }
    }

    /// Non-fatal problems worth reporting
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.trainer.program.trim().is_empty() {
            warnings.push("No trainer program configured, using synthetic trainer".to_string());
        }
        if self.trainer.timeout_secs == 0 {
            warnings.push("Trainer timeout is 0, every training call will time out".to_string());
        }
        if self.trainer.target_column.trim().is_empty() {
            warnings.push("Trainer target column is empty".to_string());
        }
        if !self.predictor.program.trim().is_empty() && self.predictor.timeout_secs == 0 {
            warnings.push("Predictor timeout is 0, every prediction will time out".to_string());
        }
        if self.validation.max_rows_checked == 0 {
            warnings.push(
                "Row checks cover the whole dataset, large uploads will be slow".to_string(),
            );
        }
        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            warnings.push(format!("Unknown log level '{}'", self.logging.level));
        }

        warnings
    }

    pub fn dataset_schema(&self) -> DatasetSchema {
        DatasetSchema {
            variant: self.validation.schema_variant,
            max_rows_checked: self.validation.max_rows_checked,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            timeout: Duration::from_secs(self.trainer.timeout_secs),
            concurrent: self.comparison.concurrent,
            contingency: self.comparison.contingency,
        }
    }

    /// External trainer when a program is configured, synthetic otherwise
    pub fn build_trainer(&self) -> Arc<dyn Trainer> {
        if self.trainer.program.trim().is_empty() {
            return Arc::new(match self.trainer.synthetic_seed {
                Some(seed) => SyntheticTrainer::with_seed(seed),
                None => SyntheticTrainer::new(),
            });
        }
        let command =
            CommandSpec::new(self.trainer.program.clone()).with_args(self.trainer.args.clone());
        Arc::new(
            ExternalProcessTrainer::new(command)
                .with_target_column(self.trainer.target_column.clone()),
        )
    }

    pub fn build_scorer(&self) -> PredictionScorer {
        let scorer = PredictionScorer::rule_based(self.scoring.seed);
        if self.predictor.program.trim().is_empty() {
            return scorer;
        }
        let command =
            CommandSpec::new(self.predictor.program.clone()).with_args(self.predictor.args.clone());
        scorer.with_predictor(
            Arc::new(ExternalProcessPredictor::new(command, self.predictor.models_dir.clone())),
            Duration::from_secs(self.predictor.timeout_secs),
        )
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ScreeningConfig::default();
        assert_eq!(config.validation.max_rows_checked, 5);
        assert_eq!(config.trainer.target_column, "class");
        assert_eq!(config.trainer.timeout_secs, 300);
        assert!(config.comparison.concurrent);
        assert_eq!(config.comparison.contingency, ContingencySource::ReportedOrEstimated);
        assert_eq!(config.dataset_schema(), DatasetSchema::default());
    }

    #[test]
    fn test_partial_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[validation]
schema_variant = "interview_result"

[trainer]
program = "python3"
args = ["scripts/advanced_ml_trainer.py"]
timeout_secs = 120

[comparison]
contingency = "estimated"
"#
        )
        .unwrap();

        let config = ScreeningConfig::load(file.path()).unwrap();
        assert_eq!(config.validation.schema_variant, SchemaVariant::InterviewResult);
        assert_eq!(config.validation.max_rows_checked, 5);
        assert_eq!(config.trainer.args, vec!["scripts/advanced_ml_trainer.py"]);
        assert_eq!(config.orchestrator_settings().timeout, Duration::from_secs(120));
        assert_eq!(config.comparison.contingency, ContingencySource::Estimated);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[trainer\nprogram = ").unwrap();
        assert!(matches!(
            ScreeningConfig::load(file.path()),
            Err(ScreeningError::Config(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TRAINER_PROGRAM", "python3"),
            ("TRAINER_TIMEOUT_SECS", "45"),
            ("CONCURRENT", "no"),
            ("SCORING_SEED", "17"),
            ("MAX_ROWS_CHECKED", "not-a-number"),
            ("SCHEMA_VARIANT", "INTERVIEW_RESULT"),
        ]
        .into_iter()
        .collect();

        let mut config = ScreeningConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.trainer.program, "python3");
        assert_eq!(config.trainer.timeout_secs, 45);
        assert!(!config.comparison.concurrent);
        assert_eq!(config.scoring.seed, Some(17));
        assert_eq!(config.validation.max_rows_checked, 5);
        assert_eq!(config.validation.schema_variant, SchemaVariant::InterviewResult);
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = ScreeningConfig::default();
        config.trainer.timeout_secs = 0;
        config.logging.level = "chatty".to_string();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("synthetic")));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/screening.toml");
        let config = ScreeningConfig::load(path).unwrap();
        assert_eq!(config, ScreeningConfig::from_env());
    }
}
