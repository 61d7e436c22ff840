//! Comparative analysis between a run without SMOTE and a run with SMOTE
//!
//! Improvements are raw metric deltas. Each conventional/boosting pair of the
//! SMOTE run gets a McNemar test whose statistic and p-value are always
//! computed from a 2x2 table that sums to the run's test size.

use crate::catalog::{AlgorithmId, Family};
use crate::types::{
    pair_key, ComparisonAnalysis, Contingency, Improvement, McNemarTest, TrainingRunResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Significance threshold for the McNemar p-value
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Where the contingency table for a pair comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContingencySource {
    /// Use the trainer's per-sample table when it is consistent with the
    /// run metadata, otherwise estimate it
    #[default]
    ReportedOrEstimated,
    /// Always estimate from accuracies
    Estimated,
}

/// Improvements plus the SMOTE run's pairwise tests.
pub fn compare(
    without_smote: &TrainingRunResult,
    with_smote: &TrainingRunResult,
    source: ContingencySource,
) -> ComparisonAnalysis {
    ComparisonAnalysis {
        improvements: improvements(without_smote, with_smote),
        statistical_tests: statistical_tests(with_smote, source),
    }
}

/// `with - without` per metric, for ids present in both runs
pub fn improvements(
    without_smote: &TrainingRunResult,
    with_smote: &TrainingRunResult,
) -> BTreeMap<AlgorithmId, Improvement> {
    without_smote
        .results
        .iter()
        .filter_map(|(id, without)| {
            let with = with_smote.get(*id)?;
            Some((
                *id,
                Improvement {
                    name: without.name.clone(),
                    improvements: with.metrics.delta(&without.metrics),
                },
            ))
        })
        .collect()
}

/// McNemar tests for every (conventional, boosting) pair present in `run`.
pub fn statistical_tests(
    run: &TrainingRunResult,
    source: ContingencySource,
) -> BTreeMap<String, McNemarTest> {
    let ids = run.model_ids();
    let conventional = ids.iter().filter(|id| id.family() == Family::Conventional);
    let samples = run.metadata.evaluation_samples();

    let mut tests = BTreeMap::new();
    for &conv in conventional {
        for &boost in ids.iter().filter(|id| id.family() == Family::Boosting) {
            let (Some(conv_result), Some(boost_result)) = (run.get(conv), run.get(boost)) else {
                continue;
            };
            let key = pair_key(conv, boost);

            let reported = match (source, run.reported_contingency.get(&key)) {
                (ContingencySource::ReportedOrEstimated, Some(table))
                    if table.total() == samples =>
                {
                    Some(*table)
                }
                (ContingencySource::ReportedOrEstimated, Some(table)) => {
                    warn!(
                        pair = %key,
                        reported = table.total(),
                        expected = samples,
                        "reported contingency does not match test size, estimating"
                    );
                    None
                }
                _ => None,
            };

            let contingency = reported.unwrap_or_else(|| {
                estimate_contingency(
                    conv_result.metrics.accuracy,
                    boost_result.metrics.accuracy,
                    samples,
                )
            });
            let (statistic, p_value) = mcnemar(&contingency);
            debug!(pair = %key, statistic, p_value, "computed McNemar test");

            tests.insert(
                key,
                McNemarTest {
                    conventional: conv,
                    boosting: boost,
                    statistic,
                    p_value,
                    significant: p_value < SIGNIFICANCE_LEVEL,
                    contingency,
                    reported: reported.is_some(),
                },
            );
        }
    }
    tests
}

/// Build an internally consistent table over `samples` evaluations from two
/// accuracies. Correct counts are rounded; the both-correct cell takes the
/// independence estimate, bounded by what the marginals allow.
pub fn estimate_contingency(accuracy1: f64, accuracy2: f64, samples: u64) -> Contingency {
    if samples == 0 {
        return Contingency::default();
    }
    let n = samples as f64;
    let correct = |accuracy: f64| ((accuracy.clamp(0.0, 1.0) * n).round() as u64).min(samples);
    let c1 = correct(accuracy1);
    let c2 = correct(accuracy2);

    let independent = ((c1 * c2) as f64 / n).round() as u64;
    let both_correct = independent
        .max((c1 + c2).saturating_sub(samples))
        .min(c1.min(c2));

    let model1_only_correct = c1 - both_correct;
    let model2_only_correct = c2 - both_correct;
    Contingency {
        both_correct,
        model1_only_correct,
        model2_only_correct,
        both_wrong: samples - both_correct - model1_only_correct - model2_only_correct,
    }
}

/// Continuity-corrected McNemar statistic and its chi-square (1 dof)
/// p-value. No discordant pairs gives `(0, 1)`.
pub fn mcnemar(table: &Contingency) -> (f64, f64) {
    let discordant = table.discordant();
    if discordant == 0 {
        return (0.0, 1.0);
    }
    let b = table.model1_only_correct as f64;
    let c = table.model2_only_correct as f64;
    let corrected = ((b - c).abs() - 1.0).max(0.0);
    let statistic = corrected * corrected / discordant as f64;
    (statistic, chi_square_1df_survival(statistic))
}

/// `P(X > x)` for a chi-square variable with one degree of freedom
pub fn chi_square_1df_survival(x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    erfc((x / 2.0).sqrt()).clamp(0.0, 1.0)
}

/// Complementary error function, Chebyshev fit with relative error below 1.2e-7.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlgorithmResult, Metrics, TrainingMetadata};

    fn result(id: AlgorithmId, accuracy: f64, f1: f64) -> AlgorithmResult {
        AlgorithmResult {
            name: id.display_name().to_string(),
            family: id.family(),
            metrics: Metrics {
                accuracy,
                precision: 0.8,
                recall: 0.8,
                f1_score: f1,
                roc_auc: 0.85,
            },
            best_params: None,
            validation_score: None,
            feature_importance: None,
            shap_importance: None,
            cv_stats: None,
        }
    }

    fn run(entries: &[(AlgorithmId, f64, f64)], test_size: usize) -> TrainingRunResult {
        TrainingRunResult {
            results: entries
                .iter()
                .map(|&(id, acc, f1)| (id, result(id, acc, f1)))
                .collect(),
            metadata: TrainingMetadata {
                dataset_shape: [1000, 7],
                train_shape: [900, 6],
                validation_shape: [50, 6],
                test_shape: [test_size, 6],
                use_smote: true,
                class_distribution: serde_json::Value::Null,
                target_classes: None,
                algorithms_trained: None,
                feature_names: Vec::new(),
            },
            reported_contingency: BTreeMap::new(),
        }
    }

    #[test]
    fn test_improvements_only_for_shared_ids() {
        let without = run(
            &[(AlgorithmId::Logistic, 0.85, 0.85), (AlgorithmId::Knn, 0.8, 0.81)],
            50,
        );
        let with = run(
            &[(AlgorithmId::Logistic, 0.80, 0.83), (AlgorithmId::Xgboost, 0.9, 0.9)],
            50,
        );
        let deltas = improvements(&without, &with);
        assert_eq!(deltas.keys().copied().collect::<Vec<_>>(), vec![AlgorithmId::Logistic]);
        let delta = &deltas[&AlgorithmId::Logistic].improvements;
        assert_eq!(delta.accuracy, 0.80 - 0.85);
        assert_eq!(delta.f1_score, 0.83 - 0.85);
    }

    #[test]
    fn test_pairs_cross_families_only() {
        let with = run(
            &[
                (AlgorithmId::Logistic, 0.85, 0.85),
                (AlgorithmId::Svm, 0.83, 0.83),
                (AlgorithmId::Adaboost, 0.87, 0.87),
                (AlgorithmId::Xgboost, 0.89, 0.89),
            ],
            50,
        );
        let tests = statistical_tests(&with, ContingencySource::Estimated);
        let keys: Vec<_> = tests.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                "logistic_vs_adaboost",
                "logistic_vs_xgboost",
                "svm_vs_adaboost",
                "svm_vs_xgboost"
            ]
        );
        for test in tests.values() {
            assert_eq!(test.contingency.total(), 50);
            assert!(!test.reported);
        }
    }

    #[test]
    fn test_no_pairs_without_boosting() {
        let with = run(&[(AlgorithmId::Logistic, 0.85, 0.85), (AlgorithmId::Knn, 0.8, 0.8)], 50);
        assert!(statistical_tests(&with, ContingencySource::default()).is_empty());
    }

    #[test]
    fn test_reported_table_used_when_consistent() {
        let mut with = run(
            &[(AlgorithmId::Knn, 0.8, 0.8), (AlgorithmId::Adaboost, 0.87, 0.87)],
            200,
        );
        let table = Contingency {
            both_correct: 120,
            model1_only_correct: 20,
            model2_only_correct: 30,
            both_wrong: 30,
        };
        with.reported_contingency.insert("knn_vs_adaboost".into(), table);

        let tests = statistical_tests(&with, ContingencySource::ReportedOrEstimated);
        let test = &tests["knn_vs_adaboost"];
        assert!(test.reported);
        assert_eq!(test.contingency, table);
        assert!((test.statistic - 81.0 / 50.0).abs() < 1e-12);

        let estimated = statistical_tests(&with, ContingencySource::Estimated);
        assert!(!estimated["knn_vs_adaboost"].reported);
    }

    #[test]
    fn test_inconsistent_reported_table_is_replaced() {
        let mut with = run(
            &[(AlgorithmId::Knn, 0.8, 0.8), (AlgorithmId::Adaboost, 0.87, 0.87)],
            50,
        );
        with.reported_contingency.insert(
            "knn_vs_adaboost".into(),
            Contingency {
                both_correct: 120,
                model1_only_correct: 20,
                model2_only_correct: 30,
                both_wrong: 30,
            },
        );
        let tests = statistical_tests(&with, ContingencySource::ReportedOrEstimated);
        assert!(!tests["knn_vs_adaboost"].reported);
        assert_eq!(tests["knn_vs_adaboost"].contingency.total(), 50);
    }

    #[test]
    fn test_estimate_respects_marginals() {
        let table = estimate_contingency(0.8, 0.9, 50);
        assert_eq!(table.total(), 50);
        assert_eq!(table.both_correct + table.model1_only_correct, 40);
        assert_eq!(table.both_correct + table.model2_only_correct, 45);

        let table = estimate_contingency(1.0, 1.0, 7);
        assert_eq!(table.both_correct, 7);
        assert_eq!(estimate_contingency(0.5, 0.5, 0).total(), 0);
    }

    #[test]
    fn test_mcnemar_values() {
        let none = Contingency {
            both_correct: 10,
            model1_only_correct: 0,
            model2_only_correct: 0,
            both_wrong: 5,
        };
        assert_eq!(mcnemar(&none), (0.0, 1.0));

        let lopsided = Contingency {
            both_correct: 0,
            model1_only_correct: 0,
            model2_only_correct: 20,
            both_wrong: 0,
        };
        let (stat, p) = mcnemar(&lopsided);
        assert!((stat - 361.0 / 20.0).abs() < 1e-12);
        assert!(p < 0.001);

        // One discordant pair: corrected difference is zero.
        let single = Contingency {
            both_correct: 3,
            model1_only_correct: 1,
            model2_only_correct: 0,
            both_wrong: 1,
        };
        assert_eq!(mcnemar(&single).0, 0.0);
    }

    #[test]
    fn test_chi_square_survival_reference_points() {
        // 3.841 is the 95th percentile of chi-square(1).
        assert!((chi_square_1df_survival(3.841_458_82) - 0.05).abs() < 1e-5);
        assert!((chi_square_1df_survival(6.634_896_6) - 0.01).abs() < 1e-5);
        assert_eq!(chi_square_1df_survival(0.0), 1.0);
    }
}
