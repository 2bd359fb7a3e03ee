//! Scanner module for directory traversal, path spooling and content hashing.
//!
//! This module provides functionality for:
//! - Root-set normalisation (no root nested inside another)
//! - Streaming directory walks into an on-disk path spool
//! - Per-document-type payload selection
//! - Content hashing (BLAKE3 or SHA-256)
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`roots`]: root overlap elimination
//! - [`spool`]: append-then-stream external list of discovered paths
//! - [`walker`]: directory traversal and inclusion rules
//! - [`document`]: SOP Class based payload selection
//! - [`hasher`]: digest computation over payload regions
//!
//! # Example
//!
//! ```no_run
//! use dicomdupe::scanner::{Walker, WalkerConfig, PathSpool, ScanMode};
//! use std::path::PathBuf;
//!
//! let config = WalkerConfig {
//!     mode: ScanMode::Deep,
//!     ..Default::default()
//! };
//!
//! let mut spool = PathSpool::new().unwrap();
//! let walker = Walker::new(vec![PathBuf::from("/archive")], config);
//! let stats = walker.walk_into(&mut spool).unwrap();
//! println!("{} files spooled, {} errors", stats.files_spooled, stats.errors.len());
//! ```

pub mod document;
pub mod hasher;
pub mod roots;
pub mod spool;
pub mod walker;

use std::path::PathBuf;

// Re-export main types
pub use document::{
    Classified, ClassificationRule, DocumentClassifier, DocumentKind, PayloadSelector, SopMatch,
    DEFAULT_RULES,
};
pub use hasher::{ContentHasher, HashAlgorithm};
pub use roots::non_overlapping_roots;
pub use spool::{PathSpool, SpoolError, SpoolReader};
pub use walker::{WalkStats, Walker};

/// Which regular files the walker hands to the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Only files with no extension, `.dcm` or `.dicom` (case-insensitive).
    #[default]
    Filtered,
    /// Every non-hidden regular file; format detection happens by content.
    Deep,
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Inclusion rule for regular files.
    pub mode: ScanMode,

    /// Follow symbolic links during traversal.
    /// Symlink cycles are detected and reported as errors by the walker.
    pub follow_symlinks: bool,
}

impl WalkerConfig {
    /// Create a new configuration.
    ///
    /// # Arguments
    ///
    /// * `mode` - Filtered (extension-based) or deep (every file)
    /// * `follow_symlinks` - Whether to follow symbolic links
    #[must_use]
    pub fn new(mode: ScanMode, follow_symlinks: bool) -> Self {
        Self {
            mode,
            follow_symlinks,
        }
    }
}

/// Errors that can occur during directory scanning.
///
/// None of these abort a walk; they are collected in [`WalkStats`].
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when reading a directory or entry.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// A symbolic link loop was detected.
    #[error("Symlink loop at {0}")]
    SymlinkLoop(PathBuf),

    /// An I/O error occurred while accessing a directory or entry.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
