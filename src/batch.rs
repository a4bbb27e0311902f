//! Multi-brand batch extraction.
//!
//! A [`BatchConfig`] describes brands, date ranges and report definitions.
//! [`plan`] turns it into a flat, deterministic list of combinations
//! (reports outermost, then date ranges, then brands) after dropping brands
//! without a real property id. [`BatchRunner`] walks that list one query at a
//! time with a fixed pause between API requests, collects rows per report
//! name, and writes one file per report that produced any rows. Reports with
//! more metrics than one request allows are split into chunk requests that
//! still count as a single combination. All files of one run share the same
//! timestamp.
//!
//! A failing combination is logged and counted but never stops the batch.
//! Only pre-flight problems (bad config, no eligible brands) are returned as
//! errors; whether the run as a whole succeeded is read off [`BatchSummary`].

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::dates;
use crate::error::{ExtractError, Result};
use crate::executor::{self, ReportExecutor};
use crate::export::Exporter;
use crate::models::{AccumulatedReport, BatchConfig, Brand, DateRange, ReportDefinition};

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Batch file syntax, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// `.json` files are JSON; everything else is read as TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Read, parse and validate a batch configuration file.
pub fn load_batch_config(path: &Path) -> Result<BatchConfig> {
    let contents = fs::read_to_string(path).map_err(|e| {
        ExtractError::Configuration(format!("cannot read batch config {}: {}", path.display(), e))
    })?;
    parse_batch_config(&contents, ConfigFormat::from_path(path))
}

pub fn parse_batch_config(contents: &str, format: ConfigFormat) -> Result<BatchConfig> {
    let config: BatchConfig = match format {
        ConfigFormat::Toml => toml::from_str(contents)
            .map_err(|e| ExtractError::Configuration(format!("invalid batch config: {}", e)))?,
        ConfigFormat::Json => serde_json::from_str(contents)
            .map_err(|e| ExtractError::Configuration(format!("invalid batch config: {}", e)))?,
    };
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// One (report, date range, brand) query.
#[derive(Debug, Clone, Copy)]
pub struct Combination<'a> {
    /// Position of `report` in the config, used as the accumulation slot.
    pub report_index: usize,
    pub report: &'a ReportDefinition,
    pub date_range: &'a DateRange,
    pub brand: &'a Brand,
}

#[derive(Debug)]
pub struct BatchPlan<'a> {
    pub combinations: Vec<Combination<'a>>,
    pub eligible: Vec<&'a Brand>,
    pub skipped: Vec<&'a Brand>,
}

/// Split brands by eligibility and enumerate every combination in
/// report → date range → brand order.
///
/// Fails with [`ExtractError::NoBrandsConfigured`] if no brand is eligible.
pub fn plan(config: &BatchConfig) -> Result<BatchPlan<'_>> {
    let (eligible, skipped): (Vec<&Brand>, Vec<&Brand>) =
        config.brands.iter().partition(|b| b.is_eligible());
    if eligible.is_empty() {
        return Err(ExtractError::NoBrandsConfigured);
    }

    let mut combinations =
        Vec::with_capacity(config.reports.len() * config.date_ranges.len() * eligible.len());
    for (report_index, report) in config.reports.iter().enumerate() {
        for date_range in &config.date_ranges {
            for &brand in &eligible {
                combinations.push(Combination {
                    report_index,
                    report,
                    date_range,
                    brand,
                });
            }
        }
    }

    Ok(BatchPlan {
        combinations,
        eligible,
        skipped,
    })
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

/// Waits between consecutive API calls.
pub trait Pacer {
    fn pause(&mut self, delay: Duration);
}

/// Blocks the current thread for the full delay.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Pacer for ThreadSleep {
    fn pause(&mut self, delay: Duration) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinationFailure {
    pub report: String,
    pub brand: String,
    pub period: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFailure {
    pub report: String,
    pub error: String,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Brands skipped for lacking a real property id.
    pub skipped: usize,
    pub files: Vec<PathBuf>,
    pub failures: Vec<CombinationFailure>,
    pub export_failures: Vec<ExportFailure>,
    /// Reports that ended up with no rows and so no file.
    pub empty_reports: Vec<String>,
}

impl BatchSummary {
    pub fn files_written(&self) -> usize {
        self.files.len()
    }

    /// A batch succeeds if it produced at least one file.
    pub fn is_success(&self) -> bool {
        !self.files.is_empty()
    }

    fn log(&self, output_dir: &Path) {
        info!(
            succeeded = self.succeeded,
            failed = self.failed,
            skipped_brands = self.skipped,
            files = self.files.len(),
            output_dir = %output_dir.display(),
            "batch complete"
        );
        for f in &self.failures {
            warn!(report = %f.report, brand = %f.brand, period = %f.period, "failed: {}", f.error);
        }
        for f in &self.export_failures {
            warn!(report = %f.report, "export failed: {}", f.error);
        }
    }
}

// ---------------------------------------------------------------------------
// BatchRunner
// ---------------------------------------------------------------------------

/// Runs a [`BatchConfig`] against a [`ReportExecutor`].
pub struct BatchRunner<E, P = ThreadSleep> {
    executor: E,
    exporter: Exporter,
    pacer: P,
    today: NaiveDate,
    export_time: Option<DateTime<Utc>>,
}

impl<E: ReportExecutor> BatchRunner<E, ThreadSleep> {
    pub fn new(executor: E, exporter: Exporter) -> Self {
        Self {
            executor,
            exporter,
            pacer: ThreadSleep,
            today: dates::local_today(),
            export_time: None,
        }
    }
}

impl<E: ReportExecutor, P: Pacer> BatchRunner<E, P> {
    /// Replace the pacer.
    pub fn with_pacer<Q: Pacer>(self, pacer: Q) -> BatchRunner<E, Q> {
        BatchRunner {
            executor: self.executor,
            exporter: self.exporter,
            pacer,
            today: self.today,
            export_time: self.export_time,
        }
    }

    /// Resolve relative dates against `today` instead of the local date.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Stamp output files with `time` instead of the moment the run ends.
    pub fn with_export_time(mut self, time: DateTime<Utc>) -> Self {
        self.export_time = Some(time);
        self
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Run every combination of `config` and export one file per report.
    pub fn run_batch(&mut self, config: &BatchConfig) -> Result<BatchSummary> {
        let plan = plan(config)?;
        let delay = config.request_delay()?;
        if !plan.skipped.is_empty() {
            let names: Vec<&str> = plan.skipped.iter().map(|b| b.name.as_str()).collect();
            warn!(
                count = plan.skipped.len(),
                brands = ?names,
                "skipping brands without a property_id"
            );
        }

        let mut reports: Vec<AccumulatedReport> =
            config.reports.iter().map(AccumulatedReport::new).collect();
        let mut summary = BatchSummary {
            skipped: plan.skipped.len(),
            ..Default::default()
        };

        let mut calls = 0usize;
        let mut current_report = None;
        for combo in &plan.combinations {
            if current_report != Some(combo.report_index) {
                current_report = Some(combo.report_index);
                info!(
                    report = %combo.report.name,
                    brands = plan.eligible.len(),
                    periods = config.date_ranges.len(),
                    dimensions = ?combo.report.dimensions,
                    metrics = ?combo.report.metrics,
                    "starting report"
                );
            }

            let outcome = match combo.date_range.resolve(self.today) {
                Ok(dates) => {
                    if dates.is_inverted() {
                        warn!(period = %combo.date_range.label, %dates, "date range starts after it ends");
                    }
                    info!(
                        brand = %combo.brand.name,
                        period = %combo.date_range.label,
                        %dates,
                        "querying"
                    );
                    let pacer = &mut self.pacer;
                    executor::execute_chunked(
                        &self.executor,
                        &combo.brand.property_id,
                        &dates,
                        &combo.report.dimensions,
                        &combo.report.metrics,
                        combo.report.dimension_filter.as_ref(),
                        || {
                            if calls > 0 {
                                pacer.pause(delay);
                            }
                            calls += 1;
                        },
                    )
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(result) => {
                    reports[combo.report_index].append(result, combo.brand, &combo.date_range.label);
                    summary.succeeded += 1;
                }
                Err(e) => {
                    error!(
                        report = %combo.report.name,
                        brand = %combo.brand.name,
                        period = %combo.date_range.label,
                        "query failed: {}",
                        e
                    );
                    summary.failed += 1;
                    summary.failures.push(CombinationFailure {
                        report: combo.report.name.clone(),
                        brand: combo.brand.name.clone(),
                        period: combo.date_range.label.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let stamp = self.export_time.unwrap_or_else(Utc::now);
        for report in &reports {
            if report.rows.is_empty() {
                warn!(report = %report.name, "no rows collected, skipping export");
                summary.empty_reports.push(report.name.clone());
                continue;
            }
            match self.exporter.export_at(report, &report.name, stamp) {
                Ok(path) => summary.files.push(path),
                Err(e) => {
                    error!(report = %report.name, "export failed: {}", e);
                    summary.export_failures.push(ExportFailure {
                        report: report.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        summary.log(self.exporter.output_dir());
        Ok(summary)
    }
}
