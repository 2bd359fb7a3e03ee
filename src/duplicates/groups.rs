//! Hash aggregation, duplicate groups and scan counters.
//!
//! # Overview
//!
//! [`HashAggregator`] is the only owner of mutable scan state. It consumes
//! [`HashRecord`]s one at a time from the pool's consumer thread and, once
//! the stream has drained, produces a [`ScanReport`].
//!
//! - Records without a digest are counted but never grouped.
//! - Records with a digest are appended to that digest's group in
//!   completion order; index 0 is the first file that finished.
//! - Only groups with two or more paths are reported; each contributes
//!   `len - 1` redundant files.
//!
//! # Example
//!
//! ```
//! use dicomdupe::duplicates::{FileOutcome, HashAggregator, HashRecord};
//! use dicomdupe::scanner::DocumentKind;
//! use std::path::PathBuf;
//!
//! let mut aggregator = HashAggregator::new(10);
//! for name in ["/a.dcm", "/b.dcm", "/c.dcm"] {
//!     let digest = if name == "/c.dcm" { "22" } else { "11" };
//!     aggregator.push(HashRecord {
//!         path: PathBuf::from(name),
//!         outcome: FileOutcome::Hashed {
//!             kind: DocumentKind::ImageLike,
//!             digest: digest.repeat(32),
//!         },
//!     });
//! }
//!
//! let report = aggregator.finish(false);
//! assert_eq!(report.duplicate_groups.len(), 1);
//! assert_eq!(report.counters.redundant_files, 1);
//! assert_eq!(report.counters.documents_recognized, 3);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::pool::{FileOutcome, HashRecord};
use crate::scanner::DocumentKind;

/// A set of files sharing one content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Hex digest shared by every path
    pub digest: String,
    /// Kind of the first file in the group
    pub kind: DocumentKind,
    /// Paths in completion order
    #[serde(serialize_with = "serialize_paths_lossy")]
    pub paths: Vec<PathBuf>,
}

/// Write paths as strings, replacing bytes that are not valid UTF-8.
fn serialize_paths_lossy<S>(paths: &[PathBuf], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(paths.iter().map(|p| p.to_string_lossy()))
}

impl DuplicateGroup {
    /// Create a group with its first member.
    #[must_use]
    pub fn new(digest: String, kind: DocumentKind, first: PathBuf) -> Self {
        Self {
            digest,
            kind,
            paths: vec![first],
        }
    }

    /// Number of files in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the group is empty (never true for groups built here).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of redundant copies (all files except the first).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.paths.len().saturating_sub(1)
    }

    /// Whether this group is a duplicate set.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.paths.len() >= 2
    }
}

/// Counters accumulated over one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounters {
    /// Every file handed to the pool
    pub files_seen: u64,
    /// Files that produced a digest
    pub documents_recognized: u64,
    /// Files that produced no digest, for any reason
    pub null_records: u64,
    /// Files beyond the first in every duplicate group
    pub redundant_files: u64,
    /// Failures: unreadable directories and files, decode errors, panics
    pub errors: u64,
    /// Files not in the imaging format
    pub not_imaging: u64,
    /// Recognised files without a usable payload
    pub payload_missing: u64,
    /// Files above the size ceiling
    pub oversized: u64,
    /// Hashed files per document kind
    pub by_kind: BTreeMap<DocumentKind, u64>,
}

/// Final result of one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Duplicate sets, sorted by digest
    pub duplicate_groups: Vec<DuplicateGroup>,
    /// Counters
    pub counters: ScanCounters,
    /// The first few error messages, in the order they were recorded
    pub error_messages: Vec<String>,
    /// Whether the scan was cut short by a shutdown request
    pub interrupted: bool,
}

impl ScanReport {
    /// Whether at least one duplicate set was found.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.duplicate_groups.is_empty()
    }
}

/// Single-owner accumulator of hash records.
#[derive(Debug)]
pub struct HashAggregator {
    groups: HashMap<String, DuplicateGroup>,
    counters: ScanCounters,
    error_messages: Vec<String>,
    error_report_limit: usize,
}

impl Default for HashAggregator {
    fn default() -> Self {
        Self::new(10)
    }
}

impl HashAggregator {
    /// Create an aggregator keeping at most `error_report_limit` messages.
    #[must_use]
    pub fn new(error_report_limit: usize) -> Self {
        Self {
            groups: HashMap::new(),
            counters: ScanCounters::default(),
            error_messages: Vec::new(),
            error_report_limit,
        }
    }

    /// Number of records consumed so far.
    #[must_use]
    pub fn files_seen(&self) -> u64 {
        self.counters.files_seen
    }

    /// Consume one record.
    pub fn push(&mut self, record: HashRecord) {
        self.counters.files_seen += 1;

        match record.outcome {
            FileOutcome::Hashed { kind, digest } => {
                self.counters.documents_recognized += 1;
                *self.counters.by_kind.entry(kind).or_insert(0) += 1;
                match self.groups.get_mut(&digest) {
                    Some(group) => group.paths.push(record.path),
                    None => {
                        let group = DuplicateGroup::new(digest.clone(), kind, record.path);
                        self.groups.insert(digest, group);
                    }
                }
                return;
            }
            FileOutcome::NoPayload { .. } => self.counters.payload_missing += 1,
            FileOutcome::NotImaging => self.counters.not_imaging += 1,
            FileOutcome::TooLarge { .. } => self.counters.oversized += 1,
            FileOutcome::Failed(e) => self.record_error(e.to_string()),
        }
        self.counters.null_records += 1;
    }

    /// Count an error that is not tied to a file record.
    ///
    /// The first `error_report_limit` messages are kept and logged as
    /// warnings; the rest are only logged at debug level.
    pub fn record_error(&mut self, message: String) {
        self.counters.errors += 1;
        if self.error_messages.len() < self.error_report_limit {
            log::warn!("{message}");
            self.error_messages.push(message);
        } else {
            log::debug!("{message}");
        }
    }

    /// Drain into a report, dropping singleton groups.
    #[must_use]
    pub fn finish(self, interrupted: bool) -> ScanReport {
        let mut counters = self.counters;
        let mut duplicate_groups: Vec<DuplicateGroup> = self
            .groups
            .into_values()
            .filter(DuplicateGroup::is_duplicate)
            .collect();
        duplicate_groups.sort_by(|a, b| a.digest.cmp(&b.digest));

        counters.redundant_files = duplicate_groups
            .iter()
            .map(|g| g.duplicate_count() as u64)
            .sum();

        log::info!(
            "Found {} duplicate groups ({} redundant files) among {} files",
            duplicate_groups.len(),
            counters.redundant_files,
            counters.files_seen
        );

        ScanReport {
            duplicate_groups,
            counters,
            error_messages: self.error_messages,
            interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::pool::FileError;

    fn hashed(path: &str, digest: &str) -> HashRecord {
        HashRecord {
            path: PathBuf::from(path),
            outcome: FileOutcome::Hashed {
                kind: DocumentKind::ImageLike,
                digest: digest.to_string(),
            },
        }
    }

    fn failed(path: &str) -> HashRecord {
        HashRecord {
            path: PathBuf::from(path),
            outcome: FileOutcome::Failed(FileError::Panicked {
                path: PathBuf::from(path),
                message: "bad".to_string(),
            }),
        }
    }

    #[test]
    fn test_duplicate_group_counts() {
        let mut group = DuplicateGroup::new("ab".into(), DocumentKind::Waveform, "/a".into());
        assert_eq!(group.len(), 1);
        assert!(!group.is_duplicate());
        assert_eq!(group.duplicate_count(), 0);

        group.paths.push("/b".into());
        group.paths.push("/c".into());
        assert!(group.is_duplicate());
        assert_eq!(group.duplicate_count(), 2);
    }

    #[test]
    fn test_singletons_dropped_but_counted() {
        let mut agg = HashAggregator::default();
        agg.push(hashed("/one", "aa"));
        agg.push(hashed("/two", "bb"));
        let report = agg.finish(false);

        assert!(report.duplicate_groups.is_empty());
        assert!(!report.has_duplicates());
        assert_eq!(report.counters.documents_recognized, 2);
        assert_eq!(report.counters.redundant_files, 0);
    }

    #[test]
    fn test_completion_order_within_group() {
        let mut agg = HashAggregator::default();
        agg.push(hashed("/late", "cc"));
        agg.push(hashed("/x", "dd"));
        agg.push(hashed("/early", "cc"));
        agg.push(hashed("/third", "cc"));
        let report = agg.finish(false);

        assert_eq!(report.duplicate_groups.len(), 1);
        assert_eq!(
            report.duplicate_groups[0].paths,
            vec![
                PathBuf::from("/late"),
                PathBuf::from("/early"),
                PathBuf::from("/third")
            ]
        );
        assert_eq!(report.counters.redundant_files, 2);
    }

    #[test]
    fn test_groups_sorted_by_digest() {
        let mut agg = HashAggregator::default();
        for (p, d) in [("/1", "ff"), ("/2", "ff"), ("/3", "01"), ("/4", "01")] {
            agg.push(hashed(p, d));
        }
        let report = agg.finish(false);
        let digests: Vec<&str> = report
            .duplicate_groups
            .iter()
            .map(|g| g.digest.as_str())
            .collect();
        assert_eq!(digests, vec!["01", "ff"]);
    }

    #[test]
    fn test_null_records_by_reason() {
        let mut agg = HashAggregator::default();
        agg.push(hashed("/img", "aa"));
        agg.push(HashRecord {
            path: "/empty.dcm".into(),
            outcome: FileOutcome::NoPayload {
                kind: DocumentKind::ImageLike,
            },
        });
        agg.push(HashRecord {
            path: "/readme".into(),
            outcome: FileOutcome::NotImaging,
        });
        agg.push(HashRecord {
            path: "/huge.dcm".into(),
            outcome: FileOutcome::TooLarge { size: 1 << 40 },
        });
        agg.push(failed("/broken.dcm"));

        let c = agg.finish(false).counters;
        assert_eq!(c.files_seen, 5);
        assert_eq!(c.documents_recognized, 1);
        assert_eq!(c.null_records, 4);
        assert_eq!(c.payload_missing, 1);
        assert_eq!(c.not_imaging, 1);
        assert_eq!(c.oversized, 1);
        assert_eq!(c.errors, 1);
        assert_eq!(c.files_seen, c.documents_recognized + c.null_records);
    }

    #[test]
    fn test_error_messages_capped_but_all_counted() {
        let mut agg = HashAggregator::new(3);
        for i in 0..10 {
            agg.push(failed(&format!("/bad{i}")));
        }
        agg.record_error("Permission denied: /locked".to_string());

        let report = agg.finish(false);
        assert_eq!(report.counters.errors, 11);
        assert_eq!(report.error_messages.len(), 3);
        assert!(report.error_messages[0].contains("/bad0"));
    }

    #[test]
    fn test_per_kind_counts() {
        let mut agg = HashAggregator::default();
        agg.push(hashed("/a", "1"));
        agg.push(HashRecord {
            path: "/sr".into(),
            outcome: FileOutcome::Hashed {
                kind: DocumentKind::StructuredReport,
                digest: "2".into(),
            },
        });
        let c = agg.finish(true).counters;
        assert_eq!(c.by_kind.get(&DocumentKind::ImageLike), Some(&1));
        assert_eq!(c.by_kind.get(&DocumentKind::StructuredReport), Some(&1));
        assert_eq!(c.by_kind.get(&DocumentKind::Waveform), None);
    }

    #[test]
    fn test_interrupted_flag_carried() {
        assert!(HashAggregator::default().finish(true).interrupted);
    }
}
