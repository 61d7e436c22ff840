//! Bootcamp applicant screening engine
//!
//! Validates uploaded applicant datasets, drives a pluggable trainer over a
//! fixed catalog of six classifiers (optionally comparing runs with and
//! without SMOTE rebalancing), and scores new applicants per model.

pub mod catalog;
pub mod comparison;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod features;
pub mod normalizer;
pub mod orchestrator;
pub mod process;
pub mod scorer;
pub mod service;
pub mod trainer;
pub mod types;

pub use catalog::{catalog, parse_selection, AlgorithmId, AlgorithmIdentity, Family};
pub use comparison::{compare, statistical_tests, ContingencySource};
pub use config::ScreeningConfig;
pub use dataset::{
    parse_feature_records, validate, DatasetHandle, DatasetIssue, DatasetSchema, SchemaVariant,
    ValidationReport,
};
pub use errors::{Result, ScreeningError};
pub use features::FeatureVector;
pub use normalizer::{normalize, normalize_run};
pub use orchestrator::{best_algorithm, OrchestratorSettings, TrainingOptions};
pub use process::CommandSpec;
pub use scorer::{
    base_pass_probability, recommend, ExternalProcessPredictor, PredictionScorer, Predictor,
    RuleBasedScorer,
};
pub use service::{ScreeningService, SessionContext};
pub use trainer::{ExternalProcessTrainer, SyntheticTrainer, Trainer};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
