//! Report queries against the GA4 Data API.
//!
//! [`ReportExecutor`] is the single seam between the coordinators and the
//! network: one call, one `runReport` request, one [`QueryResult`]. The HTTP
//! adapter [`DataApiExecutor`] is the only implementation that talks to the
//! remote service.
//!
//! The API accepts at most [`MAX_METRICS_PER_REQUEST`] metrics per request.
//! [`execute_chunked`] splits longer metric lists and merges the partial
//! results back into one row per dimension tuple.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::auth::TokenSource;
use crate::config;
use crate::dates::ResolvedRange;
use crate::error::{ExtractError, Result};
use crate::models::{DimensionFilter, QueryResult};

/// Metrics the reporting API accepts in a single request.
pub const MAX_METRICS_PER_REQUEST: usize = 10;

/// Runs one report query.
///
/// Implementations issue exactly one request per call and never retry;
/// callers decide whether an error is fatal.
pub trait ReportExecutor {
    fn execute(
        &self,
        property_id: &str,
        dates: &ResolvedRange,
        dimensions: &[String],
        metrics: &[String],
        dimension_filter: Option<&DimensionFilter>,
    ) -> Result<QueryResult>;
}

impl<E: ReportExecutor + ?Sized> ReportExecutor for &E {
    fn execute(
        &self,
        property_id: &str,
        dates: &ResolvedRange,
        dimensions: &[String],
        metrics: &[String],
        dimension_filter: Option<&DimensionFilter>,
    ) -> Result<QueryResult> {
        (**self).execute(property_id, dates, dimensions, metrics, dimension_filter)
    }
}

// ---------------------------------------------------------------------------
// DataApiExecutor
// ---------------------------------------------------------------------------

/// [`ReportExecutor`] backed by `properties/{id}:runReport`.
///
/// The bearer token is taken from a shared [`TokenSource`] before each
/// request and refreshed there when it has expired.
pub struct DataApiExecutor {
    client: Client,
    base_url: String,
    tokens: Rc<TokenSource>,
}

impl DataApiExecutor {
    pub fn new(tokens: Rc<TokenSource>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).gzip(true).build()?;
        Ok(Self {
            client,
            base_url: config::DATA_API_BASE.to_string(),
            tokens,
        })
    }

    pub fn tokens(&self) -> &Rc<TokenSource> {
        &self.tokens
    }

    /// Point the executor at a different API root.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn send(&self, property_id: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/properties/{}:runReport", self.base_url, property_id);
        let token = self.tokens.access_token()?;
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()?;
        let status = resp.status();
        let payload: Value = resp.json().unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(ExtractError::query(
                property_id,
                api_error_message(&payload).unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }
        Ok(payload)
    }
}

impl ReportExecutor for DataApiExecutor {
    fn execute(
        &self,
        property_id: &str,
        dates: &ResolvedRange,
        dimensions: &[String],
        metrics: &[String],
        dimension_filter: Option<&DimensionFilter>,
    ) -> Result<QueryResult> {
        if property_id.is_empty() || !property_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ExtractError::query(property_id, "property id must be numeric"));
        }

        info!(
            property_id,
            dates = %dates,
            ?dimensions,
            ?metrics,
            "querying property"
        );
        let body = build_request_body(dates, dimensions, metrics, dimension_filter);
        debug!(%body, "runReport request");

        let payload = self
            .send(property_id, &body)
            .map_err(|e| match e {
                ExtractError::Query { .. } | ExtractError::CredentialsInvalid(_) => e,
                other => ExtractError::query(property_id, other),
            })?;
        let result = parse_run_report(&payload, dimensions, metrics)
            .map_err(|e| ExtractError::query(property_id, e))?;

        info!(property_id, rows = result.rows.len(), "retrieved rows");
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Metric chunking
// ---------------------------------------------------------------------------

/// Run one logical query, splitting `metrics` into requests of at most
/// [`MAX_METRICS_PER_REQUEST`].
///
/// `before_request` is called ahead of every request, which lets the batch
/// coordinator pace chunk requests like any other call. The first failing
/// chunk fails the whole query. Rows are merged by dimension values in order
/// of first appearance; a metric a chunk returned no row for is left empty.
pub fn execute_chunked<E, F>(
    executor: &E,
    property_id: &str,
    dates: &ResolvedRange,
    dimensions: &[String],
    metrics: &[String],
    dimension_filter: Option<&DimensionFilter>,
    mut before_request: F,
) -> Result<QueryResult>
where
    E: ReportExecutor + ?Sized,
    F: FnMut(),
{
    if metrics.len() <= MAX_METRICS_PER_REQUEST {
        before_request();
        return executor.execute(property_id, dates, dimensions, metrics, dimension_filter);
    }

    let width = dimensions.len() + metrics.len();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();

    for (n, chunk) in metrics.chunks(MAX_METRICS_PER_REQUEST).enumerate() {
        let offset = dimensions.len() + n * MAX_METRICS_PER_REQUEST;
        debug!(property_id, chunk = n, metrics = chunk.len(), "querying metric chunk");
        before_request();
        let partial = executor.execute(property_id, dates, dimensions, chunk, dimension_filter)?;

        for row in partial.rows {
            if row.len() != dimensions.len() + chunk.len() {
                return Err(ExtractError::query(
                    property_id,
                    format!("metric chunk {} returned a row of {} values", n, row.len()),
                ));
            }
            let key = row[..dimensions.len()].to_vec();
            let slot = *index.entry(key).or_insert_with_key(|key| {
                let mut blank = key.clone();
                blank.resize(width, String::new());
                rows.push(blank);
                rows.len() - 1
            });
            for (i, value) in row.into_iter().skip(dimensions.len()).enumerate() {
                rows[slot][offset + i] = value;
            }
        }
    }

    let header = dimensions.iter().chain(metrics).cloned().collect();
    Ok(QueryResult::new(header, rows))
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Build the JSON body of a `runReport` request.
pub fn build_request_body(
    dates: &ResolvedRange,
    dimensions: &[String],
    metrics: &[String],
    dimension_filter: Option<&DimensionFilter>,
) -> Value {
    let mut body = json!({
        "dimensions": dimensions.iter().map(|d| json!({ "name": d })).collect::<Vec<_>>(),
        "metrics": metrics.iter().map(|m| json!({ "name": m })).collect::<Vec<_>>(),
        "dateRanges": [{
            "startDate": dates.start.format("%Y-%m-%d").to_string(),
            "endDate": dates.end.format("%Y-%m-%d").to_string()
        }]
    });
    if let Some(filter) = dimension_filter {
        body["dimensionFilter"] = json!({
            "filter": {
                "fieldName": filter.field,
                "stringFilter": {
                    "matchType": filter.match_type.as_str(),
                    "value": filter.value,
                    "caseSensitive": filter.case_sensitive
                }
            }
        });
    }
    body
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunReportResponse {
    #[serde(default)]
    rows: Vec<ResponseRow>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseRow {
    #[serde(default)]
    dimension_values: Vec<CellValue>,
    #[serde(default)]
    metric_values: Vec<CellValue>,
}

#[derive(Deserialize)]
struct CellValue {
    #[serde(default)]
    value: String,
}

/// Normalize a `runReport` response into a [`QueryResult`].
///
/// The header is always the requested dimensions followed by the requested
/// metrics; rows keep the API's order. A response without `rows` is an empty
/// result, not an error.
pub fn parse_run_report(
    payload: &Value,
    dimensions: &[String],
    metrics: &[String],
) -> std::result::Result<QueryResult, String> {
    let response: RunReportResponse =
        serde_json::from_value(payload.clone()).map_err(|e| format!("unexpected response: {}", e))?;

    let header: Vec<String> = dimensions.iter().chain(metrics).cloned().collect();
    let mut rows = Vec::with_capacity(response.rows.len());
    for (i, row) in response.rows.into_iter().enumerate() {
        if row.dimension_values.len() != dimensions.len() || row.metric_values.len() != metrics.len() {
            return Err(format!(
                "row {} has {} dimension and {} metric values, expected {} and {}",
                i,
                row.dimension_values.len(),
                row.metric_values.len(),
                dimensions.len(),
                metrics.len()
            ));
        }
        rows.push(
            row.dimension_values
                .into_iter()
                .chain(row.metric_values)
                .map(|c| c.value)
                .collect(),
        );
    }
    Ok(QueryResult::new(header, rows))
}

/// Extract `error.message` (and `error.status`) from a Google API error body.
pub fn api_error_message(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    let message = error.get("message").and_then(|m| m.as_str())?;
    match error.get("status").and_then(|s| s.as_str()) {
        Some(status) => Some(format!("{}: {}", status, message)),
        None => Some(message.to_string()),
    }
}
