//! Date expressions accepted by the reporting API.
//!
//! A date expression is either an absolute ISO date (`2024-01-31`), one of the
//! keywords `today` / `yesterday`, or a relative offset such as `7daysAgo`.
//! Expressions are resolved to concrete dates before a query is issued, always
//! against an explicit "today" so resolution is deterministic.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

/// A parsed date expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DateExpr {
    Absolute(NaiveDate),
    Today,
    Yesterday,
    DaysAgo(u32),
}

impl DateExpr {
    /// Resolve the expression relative to `today`.
    pub fn resolve(&self, today: NaiveDate) -> Result<NaiveDate> {
        let days_back = match *self {
            DateExpr::Absolute(date) => return Ok(date),
            DateExpr::Today => 0,
            DateExpr::Yesterday => 1,
            DateExpr::DaysAgo(n) => u64::from(n),
        };
        today.checked_sub_days(Days::new(days_back)).ok_or_else(|| {
            ExtractError::Configuration(format!("date expression '{}' is out of range", self))
        })
    }
}

impl FromStr for DateExpr {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            "today" => return Ok(DateExpr::Today),
            "yesterday" => return Ok(DateExpr::Yesterday),
            _ => {}
        }
        if let Some(n) = s.strip_suffix("daysAgo") {
            if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(n) = n.parse::<u32>() {
                    return Ok(DateExpr::DaysAgo(n));
                }
            }
        } else if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(DateExpr::Absolute(date));
        }
        Err(ExtractError::Configuration(format!(
            "invalid date format '{}': use 'YYYY-MM-DD', 'today', 'yesterday', or 'NdaysAgo'",
            s
        )))
    }
}

impl TryFrom<String> for DateExpr {
    type Error = ExtractError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DateExpr> for String {
    fn from(value: DateExpr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateExpr::Absolute(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            DateExpr::Today => f.write_str("today"),
            DateExpr::Yesterday => f.write_str("yesterday"),
            DateExpr::DaysAgo(n) => write!(f, "{}daysAgo", n),
        }
    }
}

/// A date range with both bounds resolved to concrete dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ResolvedRange {
    /// Whether the start comes after the end.
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }
}

impl fmt::Display for ResolvedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.start, self.end)
    }
}

/// The local calendar date.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
