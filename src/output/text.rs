//! Human-readable report.
//!
//! ```text
//! Duplicate set 1 of 2 [image] 512.0 KiB each
//!   digest af13...
//!   /archive/a/IM0001
//!   /archive/b/IM0001
//!
//! Files seen:           120
//! Documents recognized: 118
//! ...
//! ```

use std::fs;
use std::io::Write;

use bytesize::ByteSize;

use super::OutputError;
use crate::duplicates::ScanReport;

/// Plain text rendering of a [`ScanReport`].
#[derive(Debug)]
pub struct TextOutput<'a> {
    report: &'a ScanReport,
}

impl<'a> TextOutput<'a> {
    /// Wrap a report.
    #[must_use]
    pub fn new(report: &'a ScanReport) -> Self {
        Self { report }
    }

    /// Write groups, counters and the first error messages.
    ///
    /// File sizes are read from disk for display only; a file that has gone
    /// away since the scan is shown without a size.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), OutputError> {
        let report = self.report;
        let total = report.duplicate_groups.len();
        let mut reclaimable = 0u64;

        for (index, group) in report.duplicate_groups.iter().enumerate() {
            let size = group
                .paths
                .first()
                .and_then(|p| fs::metadata(p).ok())
                .map(|m| m.len());
            match size {
                Some(bytes) => {
                    reclaimable += bytes * group.duplicate_count() as u64;
                    writeln!(
                        writer,
                        "Duplicate set {} of {total} [{}] {} each",
                        index + 1,
                        group.kind,
                        ByteSize::b(bytes)
                    )?;
                }
                None => writeln!(
                    writer,
                    "Duplicate set {} of {total} [{}]",
                    index + 1,
                    group.kind
                )?,
            }
            writeln!(writer, "  digest {}", group.digest)?;
            for path in &group.paths {
                writeln!(writer, "  {}", path.display())?;
            }
            writeln!(writer)?;
        }

        let c = &report.counters;
        if total == 0 {
            writeln!(writer, "No duplicates found.")?;
        }
        writeln!(writer, "Files seen:           {}", c.files_seen)?;
        writeln!(writer, "Documents recognized: {}", c.documents_recognized)?;
        for (kind, count) in &c.by_kind {
            writeln!(writer, "  {kind:<22}{count}")?;
        }
        writeln!(writer, "Not imaging files:    {}", c.not_imaging)?;
        writeln!(writer, "Missing payload:      {}", c.payload_missing)?;
        writeln!(writer, "Over size limit:      {}", c.oversized)?;
        writeln!(writer, "Duplicate sets:       {total}")?;
        writeln!(writer, "Redundant files:      {}", c.redundant_files)?;
        if reclaimable > 0 {
            writeln!(writer, "Reclaimable:          {}", ByteSize::b(reclaimable))?;
        }
        writeln!(writer, "Errors:               {}", c.errors)?;

        if !report.error_messages.is_empty() {
            writeln!(writer)?;
            let shown = report.error_messages.len() as u64;
            if c.errors > shown {
                writeln!(writer, "First {shown} of {} errors:", c.errors)?;
            } else {
                writeln!(writer, "Errors:")?;
            }
            for message in &report.error_messages {
                writeln!(writer, "  {message}")?;
            }
        }

        if report.interrupted {
            writeln!(writer)?;
            writeln!(writer, "Scan interrupted; results are partial.")?;
        }
        Ok(())
    }
}
