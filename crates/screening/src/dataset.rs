//! CSV dataset validation
//!
//! Parses the uploaded applicant table, checks the header against the active
//! schema and the first rows against their column domains, and turns a clean
//! upload into a `DatasetHandle` the training layer can hand to a trainer.
//! Problems are collected, never short-circuited.

use crate::errors::{Result, ScreeningError};
use crate::features::{
    ClassLabel, Experience, FeatureVector, Gender, Grade, InterviewOutcome, Majoring,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Number of data rows shown in the preview
pub const PREVIEW_ROWS: usize = 5;

/// Which of the two observed feature layouts an upload must follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
    /// `experience: yes|no`
    #[default]
    Experience,
    /// `tech_interview_result: Pass|Fail` in place of `experience`
    InterviewResult,
}

/// Column set and row-check scope for validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub variant: SchemaVariant,
    /// Number of data rows whose values are checked; 0 checks every row
    pub max_rows_checked: usize,
}

impl Default for DatasetSchema {
    fn default() -> Self {
        Self {
            variant: SchemaVariant::Experience,
            max_rows_checked: PREVIEW_ROWS,
        }
    }
}

impl DatasetSchema {
    pub fn new(variant: SchemaVariant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    /// Required header columns in canonical order
    pub fn required_columns(&self) -> Vec<&'static str> {
        let variant_column = match self.variant {
            SchemaVariant::Experience => "experience",
            SchemaVariant::InterviewResult => "tech_interview_result",
        };
        vec![
            "age",
            "gender",
            "grades",
            "majoring",
            variant_column,
            "logical_test_score",
            "tech_interview_grades",
            "class",
        ]
    }

    fn rules(&self) -> Vec<ColumnRule> {
        let mut rules = vec![
            ColumnRule::score("logical_test_score", "Logical test score"),
            ColumnRule::score("tech_interview_grades", "Tech interview score"),
            ColumnRule::category("gender", "Gender", "'L' or 'P'", |v| Gender::parse(v).is_some()),
            ColumnRule::category("grades", "Grades", "one of SMA, D3, S1, S2, S3", |v| {
                Grade::parse(v).is_some()
            }),
            ColumnRule::category("majoring", "Majoring", "'IT' or 'Non IT'", |v| {
                Majoring::parse(v).is_some()
            }),
        ];
        match self.variant {
            SchemaVariant::Experience => rules.push(ColumnRule::category(
                "experience",
                "Experience",
                "'yes' or 'no'",
                |v| Experience::parse(v).is_some(),
            )),
            SchemaVariant::InterviewResult => rules.push(ColumnRule::category(
                "tech_interview_result",
                "Tech interview result",
                "'Pass' or 'Fail'",
                |v| InterviewOutcome::parse(v).is_some(),
            )),
        }
        rules.push(ColumnRule::category("class", "Class", "'pass' or 'failed'", |v| {
            ClassLabel::parse(v).is_some()
        }));
        rules
    }
}

enum RuleKind {
    /// Numeric in [0, 100]; an empty cell is a violation
    Score,
    /// Checked only when the cell is non-empty
    Category {
        expected: &'static str,
        accepts: fn(&str) -> bool,
    },
}

struct ColumnRule {
    column: &'static str,
    label: &'static str,
    kind: RuleKind,
}

impl ColumnRule {
    fn score(column: &'static str, label: &'static str) -> Self {
        Self {
            column,
            label,
            kind: RuleKind::Score,
        }
    }

    fn category(
        column: &'static str,
        label: &'static str,
        expected: &'static str,
        accepts: fn(&str) -> bool,
    ) -> Self {
        Self {
            column,
            label,
            kind: RuleKind::Category { expected, accepts },
        }
    }

    fn check(&self, row_number: usize, value: Option<&str>) -> Option<DatasetIssue> {
        let raw = value.unwrap_or("");
        match &self.kind {
            RuleKind::Score => {
                let in_range = raw
                    .parse::<f64>()
                    .map(|v| (0.0..=100.0).contains(&v))
                    .unwrap_or(false);
                (!in_range).then(|| DatasetIssue::ScoreOutOfRange {
                    row: row_number,
                    column: self.column.to_string(),
                    label: self.label.to_string(),
                    found: raw.to_string(),
                })
            }
            RuleKind::Category { expected, accepts } => {
                (!raw.is_empty() && !accepts(raw)).then(|| DatasetIssue::InvalidCategory {
                    row: row_number,
                    column: self.column.to_string(),
                    label: self.label.to_string(),
                    expected: expected.to_string(),
                    found: raw.to_string(),
                })
            }
        }
    }
}

/// One validation problem. `row` is 1-based counting the header, so the
/// first data row is row 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetIssue {
    MissingColumns {
        columns: Vec<String>,
    },
    ScoreOutOfRange {
        row: usize,
        column: String,
        label: String,
        found: String,
    },
    InvalidCategory {
        row: usize,
        column: String,
        label: String,
        expected: String,
        found: String,
    },
    /// Field-level problem outside a table (single participant input)
    InvalidField {
        field: String,
        message: String,
    },
}

impl DatasetIssue {
    pub(crate) fn invalid_field(field: &str, message: String) -> Self {
        DatasetIssue::InvalidField {
            field: field.to_string(),
            message,
        }
    }

    /// Data row the issue refers to, when it refers to one
    pub fn row(&self) -> Option<usize> {
        match self {
            DatasetIssue::ScoreOutOfRange { row, .. }
            | DatasetIssue::InvalidCategory { row, .. } => Some(*row),
            _ => None,
        }
    }
}

impl fmt::Display for DatasetIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetIssue::MissingColumns { columns } => {
                write!(f, "Missing required columns: {}", columns.join(", "))
            }
            DatasetIssue::ScoreOutOfRange {
                row, label, found, ..
            } => write!(f, "Row {row}: {label} must be 0-100 (found: {found})"),
            DatasetIssue::InvalidCategory {
                row,
                label,
                expected,
                found,
                ..
            } => write!(f, "Row {row}: {label} must be {expected} (found: {found})"),
            DatasetIssue::InvalidField { message, .. } => f.write_str(message),
        }
    }
}

/// A parsed data row keyed by lower-cased header
pub type SampleRow = BTreeMap<String, String>;

/// Outcome of `validate`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub headers: Vec<String>,
    pub sample_rows: Vec<SampleRow>,
    pub errors: Vec<DatasetIssue>,
    pub row_count: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error strings as shown to the user
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Parsed table: lower-cased, trimmed header plus data rows
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn parse(text: &str) -> Result<Self> {
        // Blank lines are dropped before CSV framing.
        let body = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record?;
            records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        if records.len() < 2 {
            return Err(ScreeningError::EmptyDataset);
        }

        let headers = records
            .remove(0)
            .into_iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        Ok(Self {
            headers,
            rows: records,
        })
    }

    fn row_map(&self, row: &[String]) -> SampleRow {
        self.headers
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Validate raw CSV text against `schema`.
///
/// Fails only for unreadable input (`Parse`) or a table without a data row
/// (`EmptyDataset`); every schema or value problem lands in the report.
pub fn validate(text: &str, schema: &DatasetSchema) -> Result<ValidationReport> {
    let table = Table::parse(text)?;

    let mut errors = Vec::new();

    let missing: Vec<String> = schema
        .required_columns()
        .into_iter()
        .filter(|column| table.column_index(column).is_none())
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        errors.push(DatasetIssue::MissingColumns { columns: missing });
    }

    let rules = schema.rules();
    let checked = if schema.max_rows_checked == 0 {
        table.rows.len()
    } else {
        schema.max_rows_checked.min(table.rows.len())
    };

    for (idx, row) in table.rows.iter().take(checked).enumerate() {
        let row_number = idx + 2;
        for rule in &rules {
            // A column absent from the header is already reported once above.
            let Some(col) = table.column_index(rule.column) else {
                continue;
            };
            let value = row.get(col).map(|v| v.trim());
            if let Some(issue) = rule.check(row_number, value) {
                errors.push(issue);
            }
        }
    }

    let sample_rows = table
        .rows
        .iter()
        .take(PREVIEW_ROWS)
        .map(|row| table.row_map(row))
        .collect();

    debug!(
        rows = table.rows.len(),
        checked,
        issues = errors.len(),
        "dataset validated"
    );

    Ok(ValidationReport {
        headers: table.headers,
        sample_rows,
        errors,
        row_count: table.rows.len(),
    })
}

/// Validate raw bytes; undecodable text is a `Parse` error.
pub fn validate_bytes(bytes: &[u8], schema: &DatasetSchema) -> Result<ValidationReport> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ScreeningError::Parse(format!("dataset is not valid UTF-8: {e}")))?;
    validate(text, schema)
}

/// A validated upload, ready to be handed to a trainer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetHandle {
    #[serde(skip)]
    text: String,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub variant: SchemaVariant,
    /// Label counts over every row, keyed by canonical label
    pub class_counts: BTreeMap<String, usize>,
}

impl DatasetHandle {
    /// Validate `text` and wrap it. Any issue fails with the full list.
    pub fn from_text(text: impl Into<String>, schema: &DatasetSchema) -> Result<Self> {
        let text = text.into();
        let report = validate(&text, schema)?;
        if !report.is_valid() {
            return Err(ScreeningError::ValidationFailed(report.errors));
        }

        let table = Table::parse(&text)?;
        let mut class_counts = BTreeMap::new();
        if let Some(col) = table.column_index("class") {
            for row in &table.rows {
                if let Some(label) = row.get(col).and_then(|v| ClassLabel::parse(v)) {
                    *class_counts.entry(label.as_str().to_string()).or_insert(0) += 1;
                }
            }
        }

        info!(
            rows = report.row_count,
            columns = report.headers.len(),
            "dataset accepted"
        );

        Ok(Self {
            text,
            headers: report.headers,
            row_count: report.row_count,
            variant: schema.variant,
            class_counts,
        })
    }

    /// Load and validate a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P, schema: &DatasetSchema) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let text = String::from_utf8(bytes)
            .map_err(|e| ScreeningError::Parse(format!("dataset is not valid UTF-8: {e}")))?;
        Self::from_text(text, schema)
    }

    /// Raw CSV text as uploaded
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of feature columns (every column except the label)
    pub fn feature_count(&self) -> usize {
        self.headers.iter().filter(|h| h.as_str() != "class").count()
    }
}

/// Parse a participant CSV into one feature vector per data row. Rows that
/// fail to parse or check carry their issues instead of aborting the batch.
pub fn parse_feature_records(
    text: &str,
) -> Result<Vec<std::result::Result<FeatureVector, Vec<DatasetIssue>>>> {
    let table = Table::parse(text)?;
    Ok(table
        .rows
        .iter()
        .map(|row| FeatureVector::from_record(&table.row_map(row)))
        .collect())
}
