//! Duplicate finder orchestrating the scan pipeline.
//!
//! # Overview
//!
//! [`DuplicateFinder`] runs one scan end to end:
//!
//! 1. **Roots** - validate, canonicalise and remove nested roots
//! 2. **Walk** - stream every included file into a [`PathSpool`]
//! 3. **Hash** - feed the spool through the [`WorkerPool`]
//! 4. **Aggregate** - group digests in a [`HashAggregator`]
//!
//! Discovery finishes before hashing starts, and the spool is dropped (and
//! its storage reclaimed) when the scan returns, on every path out of it.
//!
//! # Example
//!
//! ```no_run
//! use dicomdupe::duplicates::{DuplicateFinder, FinderConfig};
//! use std::path::PathBuf;
//!
//! let config = FinderConfig::default().with_concurrency(4);
//! let finder = DuplicateFinder::new(config);
//!
//! let report = finder
//!     .find_duplicates_in_paths(vec![PathBuf::from("/archive")])
//!     .unwrap();
//! println!("Found {} duplicate groups", report.duplicate_groups.len());
//! println!("Redundant files: {}", report.counters.redundant_files);
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::groups::{HashAggregator, ScanReport};
use super::pool::{
    default_concurrency, FileProcessor, HashRecord, PoolError, WorkerPool, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_MMAP_THRESHOLD,
};
use crate::dicom::{FormatDecoder, Part10Decoder};
use crate::progress::ProgressCallback;
use crate::scanner::{
    non_overlapping_roots, DocumentClassifier, HashAlgorithm, PathSpool, SpoolError, Walker,
    WalkerConfig,
};

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Number of files processed concurrently.
    pub concurrency: usize,
    /// Files larger than this are skipped.
    pub max_file_size: u64,
    /// Files at least this large are memory-mapped.
    pub mmap_threshold: u64,
    /// Digest algorithm.
    pub hash_algorithm: HashAlgorithm,
    /// Walker configuration (scan mode, symlinks).
    pub walker_config: WalkerConfig,
    /// Directory for the path spool; system temp dir when `None`.
    pub spool_dir: Option<PathBuf>,
    /// How many error messages are kept in the report.
    pub error_report_limit: usize,
    /// Format decoder collaborator.
    pub decoder: Arc<dyn FormatDecoder>,
    /// Classification table.
    pub classifier: DocumentClassifier,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("concurrency", &self.concurrency)
            .field("max_file_size", &self.max_file_size)
            .field("mmap_threshold", &self.mmap_threshold)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("walker_config", &self.walker_config)
            .field("spool_dir", &self.spool_dir)
            .field("error_report_limit", &self.error_report_limit)
            .field("decoder", &"<decoder>")
            .field("classifier", &self.classifier)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
            hash_algorithm: HashAlgorithm::default(),
            walker_config: WalkerConfig::default(),
            spool_dir: None,
            error_report_limit: 10,
            decoder: Arc::new(Part10Decoder),
            classifier: DocumentClassifier::default(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl FinderConfig {
    /// Set the number of concurrent file operations (minimum 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the per-file size ceiling.
    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Set the memory-mapping threshold.
    #[must_use]
    pub fn with_mmap_threshold(mut self, bytes: u64) -> Self {
        self.mmap_threshold = bytes;
        self
    }

    /// Set the digest algorithm.
    #[must_use]
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Place the path spool in `dir`.
    #[must_use]
    pub fn with_spool_dir(mut self, dir: PathBuf) -> Self {
        self.spool_dir = Some(dir);
        self
    }

    /// Set how many error messages are kept.
    #[must_use]
    pub fn with_error_report_limit(mut self, limit: usize) -> Self {
        self.error_report_limit = limit;
        self
    }

    /// Use a different format decoder.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn FormatDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Use a different classification table.
    #[must_use]
    pub fn with_classifier(mut self, classifier: DocumentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Errors that stop a scan before or outside per-file processing.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// No root directories were given.
    #[error("No directories given to scan")]
    NoRoots,

    /// The scan was interrupted before it started.
    #[error("Scan interrupted by user")]
    Interrupted,

    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A root could not be resolved.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The path spool could not be created or written.
    #[error(transparent)]
    Spool(#[from] SpoolError),

    /// The worker pool could not be started.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Duplicate finder running the walk → spool → pool → aggregate pipeline.
#[derive(Debug)]
pub struct DuplicateFinder {
    config: FinderConfig,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Create a new duplicate finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Scan `roots` and report duplicate sets.
    ///
    /// Per-file and per-directory problems never fail the scan; they are
    /// counted in the report. A shutdown request during the scan yields a
    /// report with [`ScanReport::interrupted`] set.
    ///
    /// # Errors
    ///
    /// Returns `FinderError` if:
    /// - `roots` is empty
    /// - a root does not exist or is not a directory
    /// - shutdown was requested before the scan started
    /// - the spool cannot be created or written
    pub fn find_duplicates_in_paths(&self, roots: Vec<PathBuf>) -> Result<ScanReport, FinderError> {
        let start_time = Instant::now();

        let roots = self.resolve_roots(roots)?;

        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        log::info!(
            "Scanning {} directory root(s): {:?}",
            roots.len(),
            roots.iter().map(|p| p.display()).collect::<Vec<_>>()
        );

        // Phase 1: discovery into the spool
        let mut spool = match self.config.spool_dir {
            Some(ref dir) => PathSpool::new_in(dir)?,
            None => PathSpool::new()?,
        };

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start("walking", 0);
            callback.on_message(&format!("Walking {} directories", roots.len()));
        }

        let mut walker = Walker::new(roots, self.config.walker_config.clone());
        if let Some(ref flag) = self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(flag.clone());
        }
        if let Some(ref callback) = self.config.progress_callback {
            walker = walker.with_progress_callback(callback.clone());
        }
        let walk_stats = walker.walk_into(&mut spool)?;

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end("walking");
        }

        let mut aggregator = HashAggregator::new(self.config.error_report_limit);
        for error in &walk_stats.errors {
            aggregator.record_error(error.to_string());
        }

        if walk_stats.interrupted {
            log::info!("Scan interrupted during directory walk");
            return Ok(aggregator.finish(true));
        }

        // Phase 2: classify and hash
        let reader = spool.into_reader()?;
        let total = usize::try_from(reader.total()).unwrap_or(usize::MAX);
        log::info!("Hashing {} files", total);

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start("hashing", total);
        }

        let processor = FileProcessor::default()
            .with_decoder(self.config.decoder.clone())
            .with_classifier(self.config.classifier.clone())
            .with_algorithm(self.config.hash_algorithm)
            .with_max_file_size(self.config.max_file_size)
            .with_mmap_threshold(self.config.mmap_threshold);

        let mut pool = WorkerPool::new(self.config.concurrency);
        if let Some(ref flag) = self.config.shutdown_flag {
            pool = pool.with_shutdown_flag(flag.clone());
        }

        let callback = self.config.progress_callback.clone();
        let outcome = pool.run(reader, &processor, |record: HashRecord| {
            if let Some(ref callback) = callback {
                let current = usize::try_from(aggregator.files_seen() + 1).unwrap_or(usize::MAX);
                callback.on_progress(current, &record.path.to_string_lossy());
            }
            aggregator.push(record);
        })?;

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end("hashing");
        }

        if let Some(error) = outcome.spool_error {
            aggregator.record_error(format!("Stopped reading path spool: {error}"));
        }

        let report = aggregator.finish(outcome.interrupted);
        log::info!(
            "Scan finished in {:.2?}: {} files, {} recognized, {} errors",
            start_time.elapsed(),
            report.counters.files_seen,
            report.counters.documents_recognized,
            report.counters.errors
        );

        Ok(report)
    }

    /// Validate and canonicalise roots, then drop nested ones.
    fn resolve_roots(&self, roots: Vec<PathBuf>) -> Result<Vec<PathBuf>, FinderError> {
        if roots.is_empty() {
            return Err(FinderError::NoRoots);
        }

        let mut resolved = Vec::with_capacity(roots.len());
        for root in roots {
            if !root.exists() {
                return Err(FinderError::PathNotFound(root));
            }
            if !root.is_dir() {
                return Err(FinderError::NotADirectory(root));
            }
            let canonical = root
                .canonicalize()
                .map_err(|source| FinderError::Io { path: root, source })?;
            resolved.push(canonical);
        }

        Ok(non_overlapping_roots(resolved))
    }
}
