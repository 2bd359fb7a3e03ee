//! Report writers for finished scans.
//!
//! - [`text`] for people at a terminal
//! - [`json`] for automation: one pretty document, or line-delimited events
//!
//! # Example
//!
//! ```no_run
//! use dicomdupe::duplicates::DuplicateFinder;
//! use dicomdupe::error::ExitCode;
//! use dicomdupe::output::json::JsonOutput;
//! use std::path::PathBuf;
//!
//! let finder = DuplicateFinder::with_defaults();
//! let report = finder.find_duplicates_in_paths(vec![PathBuf::from("/archive")]).unwrap();
//!
//! let output = JsonOutput::new(&report, ExitCode::from_report(&report));
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod json;
pub mod text;

use std::io::Write;

pub use json::{JsonLinesOutput, JsonOutput};
pub use text::TextOutput;

use crate::cli::OutputFormat;
use crate::duplicates::ScanReport;
use crate::error::ExitCode;

/// Errors that can occur while writing a report.
#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error while writing report: {0}")]
    Io(#[from] std::io::Error),
}

/// Write `report` to `writer` in the requested format.
///
/// # Errors
///
/// Returns [`OutputError`] if serialization or writing fails.
pub fn write_report<W: Write>(
    writer: &mut W,
    format: OutputFormat,
    report: &ScanReport,
    exit_code: ExitCode,
) -> Result<(), OutputError> {
    match format {
        OutputFormat::Text => TextOutput::new(report).write_to(writer),
        OutputFormat::Json => JsonOutput::new(report, exit_code).write_to(writer, true),
        OutputFormat::JsonLines => JsonLinesOutput::new(report, exit_code).write_to(writer),
    }
}
