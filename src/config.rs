//! Endpoints, defaults, and environment-style settings.
//!
//! Settings are read from `GA4_*` variables. Every constructor also has a
//! `from_vars` form taking an explicit key/value map so callers (and tests)
//! do not depend on the process environment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::dates::DateExpr;
use crate::error::{ExtractError, Result};
use crate::export::Delimiter;
use crate::models::{is_safe_name, validate_fields, DateRange};

pub const DATA_API_BASE: &str = "https://analyticsdata.googleapis.com/v1beta";
pub const ADMIN_API_BASE: &str = "https://analyticsadmin.googleapis.com/v1beta";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/analytics.readonly"];

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_START_DATE: &str = "30daysAgo";
pub const DEFAULT_END_DATE: &str = "today";
pub const DEFAULT_DIMENSIONS: &str = "country,city";
pub const DEFAULT_METRICS: &str = "activeUsers,sessions";
pub const DEFAULT_OUTPUT_PREFIX: &str = "ga4_report";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_BATCH_CONFIG: &str = "batch_config.toml";

/// Subdirectory of the output directory that batch files are written to.
pub const BATCH_SUBDIR: &str = "batch";

pub fn default_token_path() -> PathBuf {
    if let Some(config) = dirs::config_dir() {
        config.join("ga4-extract").join("token.json")
    } else {
        PathBuf::from("credentials/token.json")
    }
}

// ---------------------------------------------------------------------------
// Vars — key/value source
// ---------------------------------------------------------------------------

/// Snapshot of environment-style variables.
#[derive(Debug, Clone, Default)]
pub struct Vars(HashMap<String, String>);

impl Vars {
    pub fn from_env() -> Self {
        Self(std::env::vars().collect())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Vars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ---------------------------------------------------------------------------
// Settings — shared by every mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub token_path: PathBuf,
    pub output_dir: PathBuf,
    pub delimiter: Delimiter,
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token_path: default_token_path(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            delimiter: Delimiter::Comma,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&Vars::from_env())
    }

    pub fn from_vars(vars: &Vars) -> Result<Self> {
        let mut settings = Settings::default();
        if let Some(path) = vars.get("GA4_TOKEN_PATH") {
            settings.token_path = PathBuf::from(path);
        }
        if let Some(dir) = vars.get("GA4_OUTPUT_DIR") {
            settings.output_dir = PathBuf::from(dir);
        }
        if let Some(delimiter) = vars.get("GA4_CSV_DELIMITER") {
            settings.delimiter = delimiter.parse()?;
        }
        if let Some(secs) = vars.get("GA4_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ExtractError::Configuration(format!(
                    "GA4_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    secs
                ))
            })?;
            settings.timeout = Duration::from_secs(secs);
        }
        Ok(settings)
    }

    /// Where batch files are written.
    pub fn batch_output_dir(&self) -> PathBuf {
        self.output_dir.join(BATCH_SUBDIR)
    }
}

// ---------------------------------------------------------------------------
// SingleRunSettings — one property, one date range, one report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SingleRunSettings {
    pub property_id: String,
    pub date_range: DateRange,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub output_prefix: String,
}

impl SingleRunSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&Vars::from_env())
    }

    pub fn from_vars(vars: &Vars) -> Result<Self> {
        let property_id = vars
            .get("GA4_PROPERTY_ID")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ExtractError::Configuration("GA4_PROPERTY_ID is required".to_string()))?;
        if !property_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ExtractError::Configuration(format!(
                "GA4_PROPERTY_ID must be numeric, got '{}'",
                property_id
            )));
        }

        let start: DateExpr = vars.get_or("GA4_START_DATE", DEFAULT_START_DATE).parse()?;
        let end: DateExpr = vars.get_or("GA4_END_DATE", DEFAULT_END_DATE).parse()?;

        let dimensions = split_list(vars.get_or("GA4_DIMENSIONS", DEFAULT_DIMENSIONS));
        let metrics = split_list(vars.get_or("GA4_METRICS", DEFAULT_METRICS));
        validate_fields("GA4_DIMENSIONS", "dimensions", &dimensions, 0)?;
        validate_fields("GA4_METRICS", "metrics", &metrics, 1)?;

        let output_prefix = vars.get_or("GA4_OUTPUT_PREFIX", DEFAULT_OUTPUT_PREFIX).trim();
        if !is_safe_name(output_prefix) {
            return Err(ExtractError::Configuration(
                "GA4_OUTPUT_PREFIX must be alphanumeric with dashes/underscores".to_string(),
            ));
        }

        Ok(Self {
            property_id: property_id.to_string(),
            date_range: DateRange::new(format!("{}..{}", start, end), start, end),
            dimensions,
            metrics,
            output_prefix: output_prefix.to_string(),
        })
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
