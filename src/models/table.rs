use crate::models::{Brand, ReportDefinition};

/// Extra columns appended to every accumulated batch row.
pub const BATCH_CONTEXT_COLUMNS: [&str; 3] = ["brand_name", "property_id", "period"];

/// Anything the exporter can write: a header plus rows of cell values.
pub trait Table {
    fn header(&self) -> &[String];
    fn rows(&self) -> &[Vec<String>];

    fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

// ---------------------------------------------------------------------------
// QueryResult — One normalized API response
// ---------------------------------------------------------------------------

/// Result of a single report query.
///
/// `header` is the requested dimensions followed by the requested metrics;
/// `rows` keep the order the API returned them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl QueryResult {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }
}

impl Table for QueryResult {
    fn header(&self) -> &[String] {
        &self.header
    }

    fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

// ---------------------------------------------------------------------------
// AccumulatedReport — Rows for one report across brands and periods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatedReport {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl AccumulatedReport {
    pub fn new(report: &ReportDefinition) -> Self {
        let mut header = report.columns();
        header.extend(BATCH_CONTEXT_COLUMNS.iter().map(|c| c.to_string()));
        Self {
            name: report.name.clone(),
            header,
            rows: Vec::new(),
        }
    }

    /// Append every row of `result`, tagged with the brand and period label.
    pub fn append(&mut self, result: QueryResult, brand: &Brand, period: &str) {
        self.rows.reserve(result.rows.len());
        for mut row in result.rows {
            row.push(brand.name.clone());
            row.push(brand.property_id.clone());
            row.push(period.to_string());
            self.rows.push(row);
        }
    }
}

impl Table for AccumulatedReport {
    fn header(&self) -> &[String] {
        &self.header
    }

    fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}
