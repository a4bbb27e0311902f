//! Single property, single date range extraction.

use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::SingleRunSettings;
use crate::error::Result;
use crate::executor::{self, ReportExecutor};
use crate::export::Exporter;

/// Query one report and export it to one file.
///
/// Any error aborts the run before a file is written.
pub fn run_single<E: ReportExecutor + ?Sized>(
    settings: &SingleRunSettings,
    executor: &E,
    exporter: &Exporter,
    today: NaiveDate,
) -> Result<PathBuf> {
    let dates = settings.date_range.resolve(today)?;
    if dates.is_inverted() {
        warn!(%dates, "date range starts after it ends");
    }

    let result = executor::execute_chunked(
        executor,
        &settings.property_id,
        &dates,
        &settings.dimensions,
        &settings.metrics,
        None,
        || {},
    )?;

    let path = exporter.export(&result, &settings.output_prefix)?;
    info!(path = %path.display(), "report saved");
    Ok(path)
}
