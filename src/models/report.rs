use serde::{Deserialize, Serialize};

use crate::dates::{DateExpr, ResolvedRange};
use crate::error::{ExtractError, Result};

/// Upper bound on dimensions or metrics in one report definition.
pub const MAX_FIELDS: usize = 20;

// ---------------------------------------------------------------------------
// DateRange — Labelled pair of date expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub label: String,
    #[serde(alias = "start_date")]
    pub start: DateExpr,
    #[serde(alias = "end_date")]
    pub end: DateExpr,
}

impl DateRange {
    pub fn new(label: impl Into<String>, start: DateExpr, end: DateExpr) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }

    /// Resolve both bounds relative to `today`.
    pub fn resolve(&self, today: chrono::NaiveDate) -> Result<ResolvedRange> {
        Ok(ResolvedRange {
            start: self.start.resolve(today)?,
            end: self.end.resolve(today)?,
        })
    }
}

// ---------------------------------------------------------------------------
// DimensionFilter — Optional string filter on one dimension
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    #[default]
    Exact,
    BeginsWith,
    EndsWith,
    Contains,
    FullRegexp,
    PartialRegexp,
}

impl MatchType {
    /// Wire name used by the reporting API.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "EXACT",
            MatchType::BeginsWith => "BEGINS_WITH",
            MatchType::EndsWith => "ENDS_WITH",
            MatchType::Contains => "CONTAINS",
            MatchType::FullRegexp => "FULL_REGEXP",
            MatchType::PartialRegexp => "PARTIAL_REGEXP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub field: String,
    #[serde(default)]
    pub match_type: MatchType,
    pub value: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

// ---------------------------------------------------------------------------
// ReportDefinition — One named report (dimensions ++ metrics)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub name: String,
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimension_filter: Option<DimensionFilter>,
}

impl ReportDefinition {
    pub fn new(name: impl Into<String>, dimensions: &[&str], metrics: &[&str]) -> Self {
        Self {
            name: name.into(),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            dimension_filter: None,
        }
    }

    pub fn with_filter(mut self, filter: DimensionFilter) -> Self {
        self.dimension_filter = Some(filter);
        self
    }

    /// Column order of a query for this report: dimensions, then metrics.
    pub fn columns(&self) -> Vec<String> {
        self.dimensions.iter().chain(&self.metrics).cloned().collect()
    }

    /// Check name safety and field counts.
    pub fn validate(&self) -> Result<()> {
        if !is_safe_name(&self.name) {
            return Err(ExtractError::Configuration(format!(
                "report name '{}' must be alphanumeric with dashes/underscores",
                self.name
            )));
        }
        validate_fields(&self.name, "dimensions", &self.dimensions, 0)?;
        validate_fields(&self.name, "metrics", &self.metrics, 1)?;
        if let Some(filter) = &self.dimension_filter {
            if !is_field_name(&filter.field) {
                return Err(ExtractError::Configuration(format!(
                    "report '{}' filters on invalid field '{}'",
                    self.name, filter.field
                )));
            }
        }
        Ok(())
    }
}

/// Check a list of dimension or metric names for count and shape.
pub fn validate_fields(owner: &str, kind: &str, names: &[String], min: usize) -> Result<()> {
    if names.len() < min {
        return Err(ExtractError::Configuration(format!(
            "{}: {} must contain at least {} value",
            owner, kind, min
        )));
    }
    if names.len() > MAX_FIELDS {
        return Err(ExtractError::Configuration(format!(
            "{}: {} has {} entries, maximum is {}",
            owner,
            kind,
            names.len(),
            MAX_FIELDS
        )));
    }
    if let Some(bad) = names.iter().find(|n| !is_field_name(n)) {
        return Err(ExtractError::Configuration(format!(
            "{}: invalid dimension/metric name '{}'",
            owner, bad
        )));
    }
    Ok(())
}

/// `[A-Za-z][A-Za-z0-9_]*`
pub fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `[A-Za-z0-9_-]+`, usable as a file name prefix.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
