//! Shared test fixtures for the ga4-extract integration tests.
//!
//! Provides a scripted `ReportExecutor`, a pacer that records pauses instead
//! of sleeping, an identity provider stub, and small config builders.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use chrono::NaiveDate;
use ga4_extract::auth::{Credential, IdentityProvider, TokenGrant};
use ga4_extract::batch::Pacer;
use ga4_extract::dates::{DateExpr, ResolvedRange};
use ga4_extract::models::{BatchConfig, Brand, DateRange, DimensionFilter, QueryResult, ReportDefinition};
use ga4_extract::{ExtractError, ReportExecutor};

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

// ---------------------------------------------------------------------------
// StubExecutor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub property_id: String,
    pub dates: ResolvedRange,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub filter: Option<DimensionFilter>,
}

/// Returns one row per call, `[dim values.., metric values..]` derived from
/// the property id and call number, unless the property or report is set up
/// to fail.
#[derive(Default)]
pub struct StubExecutor {
    pub calls: RefCell<Vec<Call>>,
    failing_properties: HashSet<String>,
    failing_metrics: HashSet<String>,
    fixed: HashMap<String, QueryResult>,
}

impl StubExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_property(mut self, property_id: &str) -> Self {
        self.failing_properties.insert(property_id.to_string());
        self
    }

    /// Fail every call that requests `metric`.
    pub fn failing_metric(mut self, metric: &str) -> Self {
        self.failing_metrics.insert(metric.to_string());
        self
    }

    /// Always return `result` for `property_id`.
    pub fn returning(mut self, property_id: &str, result: QueryResult) -> Self {
        self.fixed.insert(property_id.to_string(), result);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl ReportExecutor for StubExecutor {
    fn execute(
        &self,
        property_id: &str,
        dates: &ResolvedRange,
        dimensions: &[String],
        metrics: &[String],
        dimension_filter: Option<&DimensionFilter>,
    ) -> ga4_extract::Result<QueryResult> {
        self.calls.borrow_mut().push(Call {
            property_id: property_id.to_string(),
            dates: *dates,
            dimensions: dimensions.to_vec(),
            metrics: metrics.to_vec(),
            filter: dimension_filter.cloned(),
        });
        let n = self.calls.borrow().len();

        if self.failing_properties.contains(property_id) {
            return Err(ExtractError::query(property_id, "PERMISSION_DENIED: no access"));
        }
        if metrics.iter().any(|m| self.failing_metrics.contains(m)) {
            return Err(ExtractError::query(property_id, "INVALID_ARGUMENT: unknown metric"));
        }
        if let Some(result) = self.fixed.get(property_id) {
            return Ok(result.clone());
        }

        let header: Vec<String> = dimensions.iter().chain(metrics).cloned().collect();
        let row: Vec<String> = dimensions
            .iter()
            .map(|d| format!("{}-{}", d, property_id))
            .chain(metrics.iter().map(|_| n.to_string()))
            .collect();
        Ok(QueryResult::new(header, vec![row]))
    }
}

// ---------------------------------------------------------------------------
// RecordingPacer
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingPacer {
    pub pauses: Vec<Duration>,
}

impl Pacer for RecordingPacer {
    fn pause(&mut self, delay: Duration) {
        self.pauses.push(delay);
    }
}

// ---------------------------------------------------------------------------
// StubProvider
// ---------------------------------------------------------------------------

/// Identity provider that hands out a fixed grant, or fails.
pub struct StubProvider {
    grant: Option<TokenGrant>,
    calls: Rc<Cell<usize>>,
}

impl StubProvider {
    pub fn granting(token: &str, expires_in: i64) -> Self {
        Self {
            grant: Some(TokenGrant {
                access_token: token.to_string(),
                expires_in: Some(expires_in),
                refresh_token: None,
            }),
            calls: Rc::new(Cell::new(0)),
        }
    }

    /// Shared handle on the number of refresh calls, usable after the
    /// provider has been boxed.
    pub fn counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.calls)
    }

    pub fn failing() -> Self {
        Self {
            grant: None,
            calls: Rc::new(Cell::new(0)),
        }
    }
}

impl IdentityProvider for StubProvider {
    fn refresh(&self, _credential: &Credential) -> ga4_extract::Result<TokenGrant> {
        self.calls.set(self.calls.get() + 1);
        self.grant
            .clone()
            .ok_or_else(|| ExtractError::CredentialsInvalid("invalid_grant: Token has been revoked".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Config builders
// ---------------------------------------------------------------------------

pub fn range(label: &str, start: &str, end: &str) -> DateRange {
    DateRange::new(
        label,
        start.parse::<DateExpr>().unwrap(),
        end.parse::<DateExpr>().unwrap(),
    )
}

pub fn config(
    date_ranges: Vec<DateRange>,
    reports: Vec<ReportDefinition>,
    brands: Vec<Brand>,
) -> BatchConfig {
    BatchConfig::new(date_ranges, reports, brands)
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

/// Parse a delimited file back into (header, rows).
pub fn read_delimited(path: &Path, delimiter: u8) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .unwrap();
    let header = rdr.headers().unwrap().iter().map(|s| s.to_string()).collect();
    let rows = rdr
        .records()
        .map(|r| r.unwrap().iter().map(|s| s.to_string()).collect())
        .collect();
    (header, rows)
}

/// All files in `dir`, sorted by name.
pub fn files_in(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}
