//! JSON report writers.
//!
//! # Document schema (`--output json`)
//!
//! ```json
//! {
//!   "duplicate_groups": [
//!     {
//!       "digest": "af13...",
//!       "kind": "image_like",
//!       "paths": ["/archive/a/IM0001", "/archive/b/IM0001"]
//!     }
//!   ],
//!   "counters": {
//!     "files_seen": 120,
//!     "documents_recognized": 118,
//!     "null_records": 2,
//!     "redundant_files": 1,
//!     "errors": 0,
//!     "not_imaging": 2,
//!     "payload_missing": 0,
//!     "oversized": 0,
//!     "by_kind": { "image_like": 118 }
//!   },
//!   "error_messages": [],
//!   "interrupted": false,
//!   "exit_code": 0,
//!   "exit_code_name": "DD000"
//! }
//! ```
//!
//! # Event stream (`--output json-lines`)
//!
//! One `{"event": "group", ...}` line per duplicate set, then a single
//! `{"event": "summary", ...}` line carrying counters and the exit code.

use std::io::Write;

use serde::Serialize;

use super::OutputError;
use crate::duplicates::{DuplicateGroup, ScanCounters, ScanReport};
use crate::error::ExitCode;

/// Complete JSON document for one scan.
#[derive(Debug, Serialize)]
pub struct JsonOutput<'a> {
    /// The report itself, inlined
    #[serde(flatten)]
    pub report: &'a ScanReport,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DD000")
    pub exit_code_name: &'static str,
}

impl<'a> JsonOutput<'a> {
    /// Wrap a report together with the exit code it produces.
    #[must_use]
    pub fn new(report: &'a ScanReport, exit_code: ExitCode) -> Self {
        Self {
            report,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix(),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON plus a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), OutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// One line of the event stream.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event<'a> {
    Group(&'a DuplicateGroup),
    Summary {
        counters: &'a ScanCounters,
        error_messages: &'a [String],
        interrupted: bool,
        exit_code: i32,
        exit_code_name: &'static str,
    },
}

/// Line-delimited JSON events for one scan.
#[derive(Debug)]
pub struct JsonLinesOutput<'a> {
    report: &'a ScanReport,
    exit_code: ExitCode,
}

impl<'a> JsonLinesOutput<'a> {
    /// Wrap a report together with the exit code it produces.
    #[must_use]
    pub fn new(report: &'a ScanReport, exit_code: ExitCode) -> Self {
        Self { report, exit_code }
    }

    /// Write every group event, then the summary event.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), OutputError> {
        for group in &self.report.duplicate_groups {
            write_line(writer, &Event::Group(group))?;
        }
        write_line(
            writer,
            &Event::Summary {
                counters: &self.report.counters,
                error_messages: &self.report.error_messages,
                interrupted: self.report.interrupted,
                exit_code: self.exit_code.as_i32(),
                exit_code_name: self.exit_code.code_prefix(),
            },
        )
    }
}

fn write_line<W: Write>(writer: &mut W, event: &Event<'_>) -> Result<(), OutputError> {
    serde_json::to_writer(&mut *writer, event)?;
    writer.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::DocumentKind;
    use std::path::PathBuf;

    fn sample_report() -> ScanReport {
        let mut first = DuplicateGroup::new("a".repeat(64), DocumentKind::ImageLike, "/x/1".into());
        first.paths.push(PathBuf::from("/y/1"));
        let mut second = DuplicateGroup::new(
            "b".repeat(64),
            DocumentKind::EncapsulatedDocument,
            "/x/report.dcm".into(),
        );
        second.paths.push(PathBuf::from("/y/report.dcm"));
        second.paths.push(PathBuf::from("/z/report.dcm"));

        let mut report = ScanReport {
            duplicate_groups: vec![first, second],
            ..Default::default()
        };
        report.counters.files_seen = 6;
        report.counters.documents_recognized = 5;
        report.counters.null_records = 1;
        report.counters.redundant_files = 3;
        report
    }

    #[test]
    fn test_document_shape() {
        let report = sample_report();
        let json = JsonOutput::new(&report, ExitCode::Success).to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        let groups = parsed["duplicate_groups"].as_array().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0]["kind"], "image_like");
        assert_eq!(groups[1]["kind"], "encapsulated_document");
        assert_eq!(groups[1]["paths"].as_array().unwrap().len(), 3);
        assert_eq!(parsed["counters"]["files_seen"], 6);
        assert_eq!(parsed["counters"]["redundant_files"], 3);
        assert_eq!(parsed["interrupted"], false);
        assert_eq!(parsed["exit_code"], 0);
        assert_eq!(parsed["exit_code_name"], "DD000");
    }

    #[test]
    fn test_compact_and_pretty() {
        let report = ScanReport::default();
        let output = JsonOutput::new(&report, ExitCode::NoDuplicates);
        assert!(!output.to_json().unwrap().contains('\n'));
        assert!(output.to_json_pretty().unwrap().contains('\n'));
    }

    #[test]
    fn test_document_round_trips_into_report() {
        let report = sample_report();
        let json = JsonOutput::new(&report, ExitCode::Success).to_json().unwrap();
        let back: ScanReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.duplicate_groups, report.duplicate_groups);
        assert_eq!(back.counters, report.counters);
    }

    #[test]
    fn test_event_stream() {
        let report = sample_report();
        let mut buffer = Vec::new();
        JsonLinesOutput::new(&report, ExitCode::Success)
            .write_to(&mut buffer)
            .unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event"], "group");
        assert_eq!(lines[0]["digest"], "a".repeat(64));
        assert_eq!(lines[1]["event"], "group");
        assert_eq!(lines[2]["event"], "summary");
        assert_eq!(lines[2]["counters"]["documents_recognized"], 5);
        assert_eq!(lines[2]["exit_code"], 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_are_written_lossily() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let odd = PathBuf::from(OsStr::from_bytes(b"/data/\xff.dcm"));
        let mut group = DuplicateGroup::new("c".repeat(64), DocumentKind::ImageLike, odd);
        group.paths.push(PathBuf::from("/data/ok.dcm"));
        let report = ScanReport {
            duplicate_groups: vec![group],
            ..Default::default()
        };

        let mut buffer = Vec::new();
        JsonOutput::new(&report, ExitCode::Success)
            .write_to(&mut buffer, false)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed["duplicate_groups"][0]["paths"][0], "/data/\u{FFFD}.dcm");

        let mut lines = Vec::new();
        JsonLinesOutput::new(&report, ExitCode::Success)
            .write_to(&mut lines)
            .unwrap();
        assert_eq!(String::from_utf8(lines).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_event_stream_empty_report() {
        let report = ScanReport {
            interrupted: true,
            ..Default::default()
        };
        let mut buffer = Vec::new();
        JsonLinesOutput::new(&report, ExitCode::Interrupted)
            .write_to(&mut buffer)
            .unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), 1);
        let summary: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(summary["interrupted"], true);
        assert_eq!(summary["exit_code"], 130);
    }
}
