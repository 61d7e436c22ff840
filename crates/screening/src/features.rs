//! Applicant feature vector and its categorical domains
//!
//! A `FeatureVector` is one dataset record without the `class` label. It is
//! built from loosely typed input (CSV cells, JSON form values) and checked
//! before scoring.

use crate::dataset::DatasetIssue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Minimum applicant age accepted for scoring
pub const MIN_AGE: f64 = 16.0;
/// Maximum applicant age accepted for scoring
pub const MAX_AGE: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "L")]
    Male,
    #[serde(rename = "P")]
    Female,
}

impl Gender {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "L" => Some(Gender::Male),
            "P" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// Highest completed education level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grade {
    Sma,
    D3,
    S1,
    S2,
    S3,
}

impl Grade {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "SMA" => Some(Grade::Sma),
            "D3" => Some(Grade::D3),
            "S1" => Some(Grade::S1),
            "S2" => Some(Grade::S2),
            "S3" => Some(Grade::S3),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Majoring {
    #[serde(rename = "IT")]
    It,
    #[serde(rename = "Non IT")]
    NonIt,
}

impl Majoring {
    /// Exact match only; "it" or "non it" are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "IT" => Some(Majoring::It),
            "Non IT" => Some(Majoring::NonIt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Experience {
    Yes,
    No,
}

impl Experience {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "yes" => Some(Experience::Yes),
            "no" => Some(Experience::No),
            _ => None,
        }
    }
}

/// Technical interview outcome (alternative schema variant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterviewOutcome {
    Pass,
    Fail,
}

impl InterviewOutcome {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pass" => Some(InterviewOutcome::Pass),
            "fail" => Some(InterviewOutcome::Fail),
            _ => None,
        }
    }
}

/// Training label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassLabel {
    Pass,
    Failed,
}

impl ClassLabel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pass" => Some(ClassLabel::Pass),
            "failed" => Some(ClassLabel::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassLabel::Pass => "pass",
            ClassLabel::Failed => "failed",
        }
    }
}

/// One applicant, as scored by the prediction layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub age: f64,
    pub gender: Gender,
    pub grades: Grade,
    pub majoring: Majoring,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<Experience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_interview_result: Option<InterviewOutcome>,
    pub logical_test_score: f64,
    #[serde(alias = "tech_interview_score")]
    pub tech_interview_grades: f64,
}

impl FeatureVector {
    /// Build a vector from a header -> cell map. Keys are matched
    /// case-insensitively; `tech_interview_score` is accepted for
    /// `tech_interview_grades`. Every problem is reported, not just the first.
    pub fn from_record(record: &BTreeMap<String, String>) -> Result<Self, Vec<DatasetIssue>> {
        let fields: BTreeMap<String, &str> = record
            .iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim()))
            .collect();
        let get = |name: &str| fields.get(name).copied().filter(|v| !v.is_empty());

        let mut issues = Vec::new();

        let mut number = |name: &str, value: Option<&str>| -> f64 {
            match value.map(str::parse::<f64>) {
                Some(Ok(v)) if v.is_finite() => v,
                Some(_) => {
                    issues.push(DatasetIssue::invalid_field(
                        name,
                        format!("{name} must be numeric (found: {})", value.unwrap_or_default()),
                    ));
                    f64::NAN
                }
                None => {
                    issues.push(DatasetIssue::invalid_field(name, format!("{name} is required")));
                    f64::NAN
                }
            }
        };

        let age = number("age", get("age"));
        let logical_test_score = number("logical_test_score", get("logical_test_score"));
        let tech_interview_grades = number(
            "tech_interview_grades",
            get("tech_interview_grades").or_else(|| get("tech_interview_score")),
        );

        let gender = categorical(&mut issues, "gender", get("gender"), Gender::parse, true);
        let grades = categorical(&mut issues, "grades", get("grades"), Grade::parse, true);
        let majoring = categorical(&mut issues, "majoring", get("majoring"), Majoring::parse, true);
        let experience =
            categorical(&mut issues, "experience", get("experience"), Experience::parse, false);
        let tech_interview_result = categorical(
            &mut issues,
            "tech_interview_result",
            get("tech_interview_result"),
            InterviewOutcome::parse,
            false,
        );

        match (gender, grades, majoring) {
            (Some(gender), Some(grades), Some(majoring)) if issues.is_empty() => {
                let vector = FeatureVector {
                    age,
                    gender,
                    grades,
                    majoring,
                    experience,
                    tech_interview_result,
                    logical_test_score,
                    tech_interview_grades,
                };
                vector.check()?;
                Ok(vector)
            }
            _ => Err(issues),
        }
    }

    /// Build a vector from a JSON object whose values may be numbers or strings.
    pub fn from_json(value: &Value) -> Result<Self, Vec<DatasetIssue>> {
        let object = value.as_object().ok_or_else(|| {
            vec![DatasetIssue::invalid_field(
                "participant",
                "participant must be a JSON object".to_string(),
            )]
        })?;

        let record = object
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((key.clone(), text))
            })
            .collect();

        Self::from_record(&record)
    }

    /// Range checks for the numeric fields.
    pub fn check(&self) -> Result<(), Vec<DatasetIssue>> {
        let mut issues = Vec::new();

        if !(MIN_AGE..=MAX_AGE).contains(&self.age) {
            issues.push(DatasetIssue::invalid_field(
                "age",
                format!("Age must be between 16 and 60 (found: {})", self.age),
            ));
        }
        if !(0.0..=100.0).contains(&self.logical_test_score) {
            issues.push(DatasetIssue::invalid_field(
                "logical_test_score",
                format!(
                    "Logical test score must be between 0 and 100 (found: {})",
                    self.logical_test_score
                ),
            ));
        }
        if !(0.0..=100.0).contains(&self.tech_interview_grades) {
            issues.push(DatasetIssue::invalid_field(
                "tech_interview_grades",
                format!(
                    "Tech interview score must be between 0 and 100 (found: {})",
                    self.tech_interview_grades
                ),
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    pub fn has_experience(&self) -> bool {
        self.experience == Some(Experience::Yes)
    }

    pub fn is_it_background(&self) -> bool {
        self.majoring == Majoring::It
    }
}

fn categorical<T>(
    issues: &mut Vec<DatasetIssue>,
    name: &str,
    value: Option<&str>,
    parse: fn(&str) -> Option<T>,
    required: bool,
) -> Option<T> {
    match value {
        Some(raw) => {
            let parsed = parse(raw);
            if parsed.is_none() {
                issues.push(DatasetIssue::invalid_field(
                    name,
                    format!("{name} has an unrecognized value (found: {raw})"),
                ));
            }
            parsed
        }
        None => {
            if required {
                issues.push(DatasetIssue::invalid_field(name, format!("{name} is required")));
            }
            None
        }
    }
}
