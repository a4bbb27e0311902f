//! Delimited-text export with timestamped file names.
//!
//! Files are named `{prefix}_{YYYYMMDD_HHMMSS}.csv` and written to a `.tmp`
//! sibling first, then renamed, so an interrupted export never leaves a
//! truncated file behind.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ExtractError, Result};
use crate::models::Table;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// Delimiter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    #[default]
    Comma,
    Semicolon,
    Tab,
    Pipe,
}

impl Delimiter {
    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Semicolon => b';',
            Delimiter::Tab => b'\t',
            Delimiter::Pipe => b'|',
        }
    }
}

impl FromStr for Delimiter {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "," | "comma" => Ok(Delimiter::Comma),
            ";" | "semicolon" => Ok(Delimiter::Semicolon),
            "\t" | "\\t" | "tab" => Ok(Delimiter::Tab),
            "|" | "pipe" => Ok(Delimiter::Pipe),
            other => Err(ExtractError::Configuration(format!(
                "csv delimiter must be one of: comma (,), semicolon (;), tab, or pipe (|), got '{}'",
                other.escape_debug()
            ))),
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Delimiter::Comma => ",",
            Delimiter::Semicolon => ";",
            Delimiter::Tab => "\\t",
            Delimiter::Pipe => "|",
        })
    }
}

// ---------------------------------------------------------------------------
// Exporter
// ---------------------------------------------------------------------------

/// Writes [`Table`]s as delimited text files under one output directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    delimiter: Delimiter,
}

impl Exporter {
    pub fn new<P: AsRef<Path>>(output_dir: P, delimiter: Delimiter) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            delimiter,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    /// Export `table`, stamping the file name with the current UTC time.
    pub fn export<T: Table + ?Sized>(&self, table: &T, prefix: &str) -> Result<PathBuf> {
        self.export_at(table, prefix, Utc::now())
    }

    /// Export `table` using an explicit timestamp for the file name.
    ///
    /// Creates the output directory if needed. Returns the path written.
    pub fn export_at<T: Table + ?Sized>(
        &self,
        table: &T,
        prefix: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let path = self.output_dir.join(file_name(prefix, timestamp));
        let export_err = |cause: String| ExtractError::Export {
            path: path.clone(),
            cause,
        };

        fs::create_dir_all(&self.output_dir).map_err(|e| export_err(e.to_string()))?;

        if table.is_empty() {
            warn!(path = %path.display(), "no rows to export, writing header only");
        }

        let tmp_path = path.with_extension("csv.tmp");
        let result = (|| -> Result<()> {
            let file = fs::File::create(&tmp_path)?;
            write_table(file, table, self.delimiter)?;
            fs::rename(&tmp_path, &path)?;
            Ok(())
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(export_err(e.to_string()));
        }

        info!(rows = table.rows().len(), path = %path.display(), "exported");
        Ok(path)
    }
}

/// `{prefix}_{YYYYMMDD_HHMMSS}.csv`
pub fn file_name(prefix: &str, timestamp: DateTime<Utc>) -> String {
    format!("{}_{}.csv", prefix, timestamp.format(TIMESTAMP_FORMAT))
}

/// Write the header and rows of `table` to `writer`.
///
/// Fields containing the delimiter, quotes or line breaks are quoted; records
/// end with `\n`.
pub fn write_table<W: Write, T: Table + ?Sized>(
    writer: W,
    table: &T,
    delimiter: Delimiter,
) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter.as_byte())
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    wtr.write_record(table.header())?;
    for row in table.rows() {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
