//! Fixed algorithm catalog
//!
//! Six classifiers split into two families. The catalog is reference data;
//! callers select from it by id and never extend it.

use crate::errors::{Result, ScreeningError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Algorithm family used to structure the pairwise comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Conventional,
    Boosting,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Conventional => "conventional",
            Family::Boosting => "boosting",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = ScreeningError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "conventional" => Ok(Family::Conventional),
            "boosting" => Ok(Family::Boosting),
            other => Err(ScreeningError::MalformedResult(format!(
                "unknown algorithm type '{other}'"
            ))),
        }
    }
}

/// Catalog entry identifier. Declaration order is catalog order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmId {
    Logistic,
    DecisionTree,
    Knn,
    Svm,
    Adaboost,
    Xgboost,
}

impl AlgorithmId {
    pub const ALL: [AlgorithmId; 6] = [
        AlgorithmId::Logistic,
        AlgorithmId::DecisionTree,
        AlgorithmId::Knn,
        AlgorithmId::Svm,
        AlgorithmId::Adaboost,
        AlgorithmId::Xgboost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmId::Logistic => "logistic",
            AlgorithmId::DecisionTree => "decision_tree",
            AlgorithmId::Knn => "knn",
            AlgorithmId::Svm => "svm",
            AlgorithmId::Adaboost => "adaboost",
            AlgorithmId::Xgboost => "xgboost",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AlgorithmId::Logistic => "Logistic Regression",
            AlgorithmId::DecisionTree => "Decision Tree",
            AlgorithmId::Knn => "k-Nearest Neighbors",
            AlgorithmId::Svm => "Support Vector Machine",
            AlgorithmId::Adaboost => "AdaBoost",
            AlgorithmId::Xgboost => "XGBoost",
        }
    }

    /// Compact label shown next to prediction results
    pub fn short_label(&self) -> &'static str {
        match self {
            AlgorithmId::Knn => "KNN",
            AlgorithmId::Svm => "SVM",
            other => other.display_name(),
        }
    }

    pub fn family(&self) -> Family {
        match self {
            AlgorithmId::Logistic
            | AlgorithmId::DecisionTree
            | AlgorithmId::Knn
            | AlgorithmId::Svm => Family::Conventional,
            AlgorithmId::Adaboost | AlgorithmId::Xgboost => Family::Boosting,
        }
    }

    /// Half-width of the uniform perturbation the rule-based scorer applies
    /// to the base pass probability for this model.
    ///
    /// | id            | amplitude |
    /// |---------------|-----------|
    /// | logistic      | ±0.050    |
    /// | decision_tree | ±0.075    |
    /// | knn           | ±0.060    |
    /// | svm           | ±0.040    |
    /// | adaboost      | ±0.030    |
    /// | xgboost       | ±0.025    |
    pub fn perturbation_amplitude(&self) -> f64 {
        match self {
            AlgorithmId::Logistic => 0.05,
            AlgorithmId::DecisionTree => 0.075,
            AlgorithmId::Knn => 0.06,
            AlgorithmId::Svm => 0.04,
            AlgorithmId::Adaboost => 0.03,
            AlgorithmId::Xgboost => 0.025,
        }
    }

    pub fn identity(&self) -> AlgorithmIdentity {
        AlgorithmIdentity {
            id: *self,
            display_name: self.display_name(),
            family: self.family(),
        }
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmId {
    type Err = ScreeningError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        AlgorithmId::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| {
                ScreeningError::InvalidRequest(format!("unknown algorithm id '{wanted}'"))
            })
    }
}

/// Catalog entry as exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmIdentity {
    pub id: AlgorithmId,
    pub display_name: &'static str,
    pub family: Family,
}

/// The full immutable catalog in declaration order
pub fn catalog() -> Vec<AlgorithmIdentity> {
    AlgorithmId::ALL.iter().map(AlgorithmId::identity).collect()
}

/// Parse a caller selection. Rejects an empty selection and any id outside
/// the catalog; repeated ids collapse to their first occurrence.
pub fn parse_selection<S: AsRef<str>>(ids: &[S]) -> Result<Vec<AlgorithmId>> {
    if ids.is_empty() {
        return Err(ScreeningError::InvalidRequest(
            "select at least one algorithm".to_string(),
        ));
    }

    let mut selection = Vec::with_capacity(ids.len());
    for raw in ids {
        let id: AlgorithmId = raw.as_ref().parse()?;
        if !selection.contains(&id) {
            selection.push(id);
        }
    }
    Ok(selection)
}
