//! Result normalization
//!
//! Enforces the canonical `AlgorithmResult` shape on whatever a trainer
//! returned: metrics are clamped into [0, 1], importance maps are rescaled to
//! sum to 1. The same shape test separates algorithm entries from sibling
//! fields (`metadata`, `statistical_analysis`, ...) bundled in one payload.

use crate::catalog::{AlgorithmId, Family};
use crate::errors::{Result, ScreeningError};
use crate::types::{
    clamp_unit, pair_key, AlgorithmResult, Contingency, CvStats, Metrics, TrainingMetadata,
    TrainingRunResult,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Whether `value` looks like an algorithm entry: an object carrying
/// `name`, `metrics` and `type`.
pub fn is_algorithm_entry(value: &Value) -> bool {
    value.as_object().map_or(false, |obj| {
        obj.get("name").map_or(false, Value::is_string)
            && obj.get("metrics").map_or(false, Value::is_object)
            && obj.get("type").map_or(false, Value::is_string)
    })
}

/// Normalize one raw algorithm entry.
pub fn normalize(raw: &Value) -> Result<AlgorithmResult> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ScreeningError::MalformedResult("algorithm entry is not an object".into()))?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ScreeningError::MalformedResult("algorithm entry has no name".into()))?
        .to_string();

    let family: Family = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ScreeningError::MalformedResult(format!("{name}: missing type")))?
        .parse()?;

    let metrics = parse_metrics(&name, obj.get("metrics"))?;

    let best_params = field(obj, &["best_params", "bestParams"])
        .filter(|v| !v.is_null())
        .cloned();

    let validation_score = match field(obj, &["validation_score", "validationScore"]) {
        None | Some(Value::Null) => None,
        Some(v) => Some(clamp_unit(v.as_f64().ok_or_else(|| {
            ScreeningError::MalformedResult(format!("{name}: validation score is not numeric"))
        })?)),
    };

    let feature_importance = importance(
        &name,
        "feature",
        field(obj, &["feature_importance", "featureImportance"]),
    )?;
    let shap_importance = importance(
        &name,
        "shap",
        field(obj, &["shap_importance", "shapImportance"]),
    )?;

    let cv_stats = match field(obj, &["cv_stats", "cvStats"]) {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_cv_stats(&name, v)?),
    };

    Ok(AlgorithmResult {
        name,
        family,
        metrics,
        best_params,
        validation_score,
        feature_importance,
        shap_importance,
        cv_stats,
    })
}

/// Normalize a whole trainer payload for the `requested` algorithms.
///
/// Every requested id must be present and well-formed; any failure rejects
/// the payload as a whole. Entries for ids that were not requested are
/// dropped.
pub fn normalize_run(payload: &Value, requested: &[AlgorithmId]) -> Result<TrainingRunResult> {
    let root = payload
        .as_object()
        .ok_or_else(|| ScreeningError::MalformedResult("trainer payload is not an object".into()))?;

    // Some trainers wrap the per-algorithm map in `results`.
    let entries = root
        .get("results")
        .and_then(Value::as_object)
        .unwrap_or(root);

    let mut results = BTreeMap::new();
    for (key, value) in entries {
        let id = key.parse::<AlgorithmId>().ok();

        if !is_algorithm_entry(value) {
            if let Some(id) = id.filter(|id| requested.contains(id)) {
                return Err(ScreeningError::MalformedResult(format!(
                    "entry for '{id}' lacks name, metrics or type"
                )));
            }
            debug!(key = %key, "skipping non-algorithm field");
            continue;
        }

        let Some(id) = id else {
            return Err(ScreeningError::MalformedResult(format!(
                "result for unknown algorithm id '{key}'"
            )));
        };
        if !requested.contains(&id) {
            warn!(algorithm = %id, "trainer returned an algorithm that was not requested");
            continue;
        }

        let result = normalize(value)?;
        if result.family != id.family() {
            return Err(ScreeningError::MalformedResult(format!(
                "'{id}' reported as {} but is a {} algorithm",
                result.family,
                id.family()
            )));
        }
        results.insert(id, result);
    }

    if let Some(missing) = requested.iter().find(|id| !results.contains_key(id)) {
        return Err(ScreeningError::MalformedResult(format!(
            "trainer returned no result for '{missing}'"
        )));
    }

    let metadata_value = entries
        .get("metadata")
        .or_else(|| root.get("metadata"))
        .ok_or_else(|| ScreeningError::MalformedResult("trainer payload has no metadata".into()))?;
    let metadata: TrainingMetadata = serde_json::from_value(metadata_value.clone())
        .map_err(|e| ScreeningError::MalformedResult(format!("invalid metadata: {e}")))?;

    let reported_contingency = entries
        .get("statistical_analysis")
        .or_else(|| root.get("statistical_analysis"))
        .and_then(Value::as_object)
        .map(|analysis| reported_tables(analysis, &results))
        .unwrap_or_default();

    Ok(TrainingRunResult {
        results,
        metadata,
        reported_contingency,
    })
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(*name))
}

/// A finite JSON number, or a string holding one. Trainers that serialize
/// numpy scalars with `str` emit `"0.25"` where a number is expected.
pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// A non-negative whole count, accepting the same forms as [`number`]
fn count(value: &Value) -> Option<u64> {
    number(value)
        .filter(|v| *v >= 0.0 && v.fract() == 0.0 && *v <= u64::MAX as f64)
        .map(|v| v as u64)
}

fn parse_metrics(name: &str, raw: Option<&Value>) -> Result<Metrics> {
    let obj = raw
        .and_then(Value::as_object)
        .ok_or_else(|| ScreeningError::MalformedResult(format!("{name}: metrics missing")))?;

    let mut values = [0.0; 5];
    for (slot, metric) in values.iter_mut().zip(Metrics::NAMES) {
        let value = obj.get(metric).and_then(number).ok_or_else(|| {
            ScreeningError::MalformedResult(format!(
                "{name}: metric '{metric}' missing or not numeric"
            ))
        })?;
        *slot = value;
    }

    Ok(Metrics {
        accuracy: values[0],
        precision: values[1],
        recall: values[2],
        f1_score: values[3],
        roc_auc: values[4],
    }
    .clamped())
}

fn parse_cv_stats(name: &str, raw: &Value) -> Result<CvStats> {
    let obj = raw.as_object().ok_or_else(|| {
        ScreeningError::MalformedResult(format!("{name}: cv stats is not an object"))
    })?;
    let stat = |keys: &[&str]| {
        field(obj, keys).and_then(number).ok_or_else(|| {
            ScreeningError::MalformedResult(format!("{name}: cv stats missing {}", keys[0]))
        })
    };
    Ok(CvStats {
        mean_f1: stat(&["mean_f1", "meanF1"])?,
        std_f1: stat(&["std_f1", "stdF1"])?,
    })
}

/// Rescale an importance map to sum to 1. An absent, null or empty map is
/// treated as not reported.
fn importance(
    algorithm: &str,
    map_name: &str,
    raw: Option<&Value>,
) -> Result<Option<BTreeMap<String, f64>>> {
    let obj = match raw {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(obj)) if obj.is_empty() => return Ok(None),
        Some(Value::Object(obj)) => obj,
        Some(_) => {
            return Err(ScreeningError::MalformedResult(format!(
                "{algorithm}: {map_name} importance is not a map"
            )))
        }
    };

    let mut weights = BTreeMap::new();
    for (feature, value) in obj {
        let weight = number(value).filter(|w| *w >= 0.0).ok_or_else(|| {
            ScreeningError::MalformedResult(format!(
                "{algorithm}: {map_name} importance for '{feature}' is not a non-negative number"
            ))
        })?;
        weights.insert(feature.clone(), weight);
    }

    renormalize(weights)
        .map(Some)
        .ok_or_else(|| ScreeningError::DegenerateImportance {
            algorithm: algorithm.to_string(),
            map: map_name.to_string(),
        })
}

/// Divide every weight by the map total. `None` when the total is zero.
pub fn renormalize(mut weights: BTreeMap<String, f64>) -> Option<BTreeMap<String, f64>> {
    let total: f64 = weights.values().sum();
    if total <= 0.0 {
        return None;
    }
    for weight in weights.values_mut() {
        *weight /= total;
    }
    Some(weights)
}

fn reported_tables(
    analysis: &Map<String, Value>,
    results: &BTreeMap<AlgorithmId, AlgorithmResult>,
) -> BTreeMap<String, Contingency> {
    let mut tables = BTreeMap::new();
    for (key, entry) in analysis {
        let Some((conventional, boosting)) = parse_pair_key(key) else {
            warn!(key = %key, "ignoring statistical analysis entry with unrecognized key");
            continue;
        };
        if !results.contains_key(&conventional) || !results.contains_key(&boosting) {
            continue;
        }
        let table = entry
            .get("mcnemar_test")
            .or_else(|| entry.get("mcnemarTest"))
            .and_then(|test| test.get("contingency"))
            .and_then(Value::as_object)
            .and_then(contingency);
        match table {
            Some(table) => {
                tables.insert(pair_key(conventional, boosting), table);
            }
            None => warn!(
                key = %key,
                "ignoring statistical analysis entry without a usable contingency table"
            ),
        }
    }
    tables
}

fn contingency(obj: &Map<String, Value>) -> Option<Contingency> {
    let cell = |keys: &[&str]| field(obj, keys).and_then(count);
    Some(Contingency {
        both_correct: cell(&["both_correct", "bothCorrect"])?,
        model1_only_correct: cell(&["model1_only_correct", "model1OnlyCorrect"])?,
        model2_only_correct: cell(&["model2_only_correct", "model2OnlyCorrect"])?,
        both_wrong: cell(&["both_wrong", "bothWrong"])?,
    })
}

/// Split `<convId>_vs_<boostId>` into its two ids, checking families.
pub fn parse_pair_key(key: &str) -> Option<(AlgorithmId, AlgorithmId)> {
    let (left, right) = key.split_once("_vs_")?;
    let conventional: AlgorithmId = left.parse().ok()?;
    let boosting: AlgorithmId = right.parse().ok()?;
    (conventional.family() == Family::Conventional && boosting.family() == Family::Boosting)
        .then_some((conventional, boosting))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_entry(name: &str, kind: &str) -> Value {
        json!({
            "name": name,
            "type": kind,
            "metrics": {
                "accuracy": 1.2,
                "precision": -0.1,
                "recall": 0.9,
                "f1_score": 0.85,
                "roc_auc": 0.88
            },
            "feature_importance": {"age": 2.0, "logical_test_score": 6.0, "gender": 2.0},
            "cv_stats": {"mean_f1": 0.84, "std_f1": 0.02}
        })
    }

    fn metadata() -> Value {
        json!({
            "dataset_shape": [100, 8],
            "train_shape": [90, 7],
            "validation_shape": [5, 7],
            "test_shape": [5, 7],
            "use_smote": false,
            "class_distribution": {"train": {"0": 30, "1": 60}}
        })
    }

    #[test]
    fn test_metrics_are_clamped() {
        let result = normalize(&raw_entry("XGBoost", "boosting")).unwrap();
        assert_eq!(result.metrics.accuracy, 1.0);
        assert_eq!(result.metrics.precision, 0.0);
        assert_eq!(result.metrics.recall, 0.9);
        assert_eq!(result.family, Family::Boosting);
    }

    #[test]
    fn test_importance_renormalized() {
        let result = normalize(&raw_entry("XGBoost", "boosting")).unwrap();
        let importance = result.feature_importance.unwrap();
        let total: f64 = importance.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((importance["logical_test_score"] - 0.6).abs() < 1e-12);
        assert!(result.shap_importance.is_none());
    }

    #[test]
    fn test_zero_importance_is_degenerate() {
        let mut raw = raw_entry("SVM", "conventional");
        raw["shap_importance"] = json!({"age": 0.0, "gender": 0.0});
        assert!(matches!(
            normalize(&raw),
            Err(ScreeningError::DegenerateImportance { .. })
        ));
    }

    #[test]
    fn test_missing_type_rejected() {
        let mut raw = raw_entry("SVM", "conventional");
        raw.as_object_mut().unwrap().remove("type");
        assert!(!is_algorithm_entry(&raw));
        assert!(matches!(normalize(&raw), Err(ScreeningError::MalformedResult(_))));
    }

    #[test]
    fn test_run_skips_sibling_fields() {
        let payload = json!({
            "logistic": raw_entry("Logistic Regression", "conventional"),
            "xgboost": raw_entry("XGBoost", "boosting"),
            "metadata": metadata(),
            "success": true,
            "statistical_analysis": {
                "logistic_vs_xgboost": {
                    "mcnemar_test": {
                        "statistic": 1.0,
                        "p_value": 0.3,
                        "significant": false,
                        "contingency": {
                            "both_correct": 3,
                            "model1_only_correct": 0,
                            "model2_only_correct": 1,
                            "both_wrong": 1
                        }
                    }
                }
            }
        });
        let run =
            normalize_run(&payload, &[AlgorithmId::Logistic, AlgorithmId::Xgboost]).unwrap();
        assert_eq!(run.len(), 2);
        assert_eq!(run.metadata.test_shape, [5, 7]);
        assert_eq!(run.reported_contingency["logistic_vs_xgboost"].total(), 5);
    }

    #[test]
    fn test_run_requires_every_requested_id() {
        let payload = json!({
            "logistic": raw_entry("Logistic Regression", "conventional"),
            "metadata": metadata()
        });
        let err = normalize_run(&payload, &[AlgorithmId::Logistic, AlgorithmId::Knn]).unwrap_err();
        assert!(matches!(err, ScreeningError::MalformedResult(_)));
    }

    #[test]
    fn test_run_rejects_family_mismatch() {
        let payload = json!({
            "adaboost": raw_entry("AdaBoost", "conventional"),
            "metadata": metadata()
        });
        assert!(normalize_run(&payload, &[AlgorithmId::Adaboost]).is_err());
    }

    #[test]
    fn test_run_accepts_wrapped_results() {
        let payload = json!({
            "success": true,
            "results": {
                "knn": raw_entry("k-Nearest Neighbors", "conventional"),
                "metadata": metadata()
            }
        });
        let run = normalize_run(&payload, &[AlgorithmId::Knn]).unwrap();
        assert!(run.get(AlgorithmId::Knn).is_some());
    }

    #[test]
    fn test_pair_key_requires_family_order() {
        assert_eq!(
            parse_pair_key("svm_vs_adaboost"),
            Some((AlgorithmId::Svm, AlgorithmId::Adaboost))
        );
        assert_eq!(parse_pair_key("adaboost_vs_svm"), None);
        assert_eq!(
            parse_pair_key("decision_tree_vs_xgboost").map(|p| p.0),
            Some(AlgorithmId::DecisionTree)
        );
    }

    #[test]
    fn test_stringified_numbers_accepted() {
        let mut raw = raw_entry("XGBoost", "boosting");
        raw["feature_importance"] = json!({"age": "0.25", "logical_test_score": "0.75"});
        raw["metrics"]["recall"] = json!("0.9");
        let result = normalize(&raw).unwrap();
        let importance = result.feature_importance.unwrap();
        assert!((importance["age"] - 0.25).abs() < 1e-12);
        assert!((importance["logical_test_score"] - 0.75).abs() < 1e-12);
        assert_eq!(result.metrics.recall, 0.9);

        raw["feature_importance"] = json!({"age": "n/a", "logical_test_score": "0.75"});
        assert!(matches!(
            normalize(&raw),
            Err(ScreeningError::MalformedResult(_))
        ));
    }

    #[test]
    fn test_stringified_contingency_counts_kept() {
        let payload = json!({
            "svm": raw_entry("SVM", "conventional"),
            "adaboost": raw_entry("AdaBoost", "boosting"),
            "xgboost": raw_entry("XGBoost", "boosting"),
            "metadata": metadata(),
            "statistical_analysis": {
                "svm_vs_adaboost": {"mcnemar_test": {"contingency": {
                    "both_correct": "2", "model1_only_correct": "1",
                    "model2_only_correct": "0", "both_wrong": "2"
                }}},
                "svm_vs_xgboost": {"mcnemar_test": {"contingency": {
                    "both_correct": "2.5", "model1_only_correct": 1,
                    "model2_only_correct": 0, "both_wrong": 2
                }}}
            }
        });
        let requested = [AlgorithmId::Svm, AlgorithmId::Adaboost, AlgorithmId::Xgboost];
        let run = normalize_run(&payload, &requested).unwrap();
        let table = run.reported_contingency["svm_vs_adaboost"];
        assert_eq!(
            table,
            Contingency {
                both_correct: 2,
                model1_only_correct: 1,
                model2_only_correct: 0,
                both_wrong: 2,
            }
        );
        assert_eq!(run.reported_contingency.len(), 1);
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(number(&json!(0.5)), Some(0.5));
        assert_eq!(number(&json!(" 12 ")), Some(12.0));
        assert_eq!(number(&json!("NaN")), None);
        assert_eq!(number(&json!(true)), None);
        assert_eq!(count(&json!("7")), Some(7));
        assert_eq!(count(&json!(-1)), None);
    }
}
