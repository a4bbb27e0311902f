use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ExtractError, Result};
use crate::models::{DateRange, ReportDefinition};

/// Property ids left in a config template that has not been filled in yet.
pub const PLACEHOLDER_PROPERTY_IDS: &[&str] = &["FILL_IN"];

pub const DEFAULT_REQUEST_DELAY_SECS: f64 = 1.0;

// ---------------------------------------------------------------------------
// Brand — One portfolio entry mapped to a property
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brand {
    pub name: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub property_id: String,
}

fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

impl Brand {
    pub fn new(name: &str, property_id: &str) -> Self {
        Self {
            name: name.to_string(),
            account_id: String::new(),
            property_id: property_id.trim().to_string(),
        }
    }

    /// A brand is queried only when it has a real property id.
    pub fn is_eligible(&self) -> bool {
        let id = self.property_id.trim();
        !id.is_empty() && !PLACEHOLDER_PROPERTY_IDS.contains(&id)
    }
}

// ---------------------------------------------------------------------------
// BatchConfig — Brands x date ranges x reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_request_delay")]
    pub request_delay_secs: f64,
    pub date_ranges: Vec<DateRange>,
    pub reports: Vec<ReportDefinition>,
    #[serde(default)]
    pub brands: Vec<Brand>,
}

fn default_request_delay() -> f64 {
    DEFAULT_REQUEST_DELAY_SECS
}

impl BatchConfig {
    pub fn new(date_ranges: Vec<DateRange>, reports: Vec<ReportDefinition>, brands: Vec<Brand>) -> Self {
        Self {
            request_delay_secs: DEFAULT_REQUEST_DELAY_SECS,
            date_ranges,
            reports,
            brands,
        }
    }

    /// The pause between API calls.
    ///
    /// Fails for negative, non-finite or out-of-range values.
    pub fn request_delay(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.request_delay_secs).map_err(|_| {
            ExtractError::Configuration(format!(
                "request_delay_secs must be a non-negative number of seconds, got {}",
                self.request_delay_secs
            ))
        })
    }

    /// Schema checks the deserializer cannot express.
    ///
    /// Brand eligibility is not checked here; ineligible brands are skipped
    /// when the batch runs.
    pub fn validate(&self) -> Result<()> {
        self.request_delay()?;
        if self.date_ranges.is_empty() {
            return Err(ExtractError::Configuration(
                "batch config defines no date_ranges".to_string(),
            ));
        }
        if self.reports.is_empty() {
            return Err(ExtractError::Configuration(
                "batch config defines no reports".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for report in &self.reports {
            report.validate()?;
            if !names.insert(report.name.as_str()) {
                return Err(ExtractError::Configuration(format!(
                    "report name '{}' is used more than once",
                    report.name
                )));
            }
        }
        Ok(())
    }
}
