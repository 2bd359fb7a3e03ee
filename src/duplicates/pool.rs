//! Bounded-concurrency processing of spooled paths.
//!
//! # Overview
//!
//! [`WorkerPool::run`] streams paths out of a [`SpoolReader`] and hands each
//! to a [`FileProcessor`] running on one of `concurrency` worker threads:
//!
//! ```text
//! SpoolReader ──feeder──▶ bounded(jobs) ──▶ N workers ──▶ bounded(results) ──▶ consumer
//! ```
//!
//! - The calling thread is the feeder. A full job queue blocks it, which is
//!   the admission gate: at most `concurrency` files are being processed
//!   and at most `concurrency` more are queued.
//! - Workers and the single consumer run on a dedicated rayon pool.
//! - Every path that is submitted produces exactly one [`HashRecord`], even
//!   when processing panics.
//! - Record order follows completion, not discovery.

use std::fs::File;
use std::io::{self, Read};
use std::num::NonZeroUsize;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::bounded;
use memmap2::Mmap;

use crate::dicom::{DecodeError, FormatDecoder, Part10Decoder};
use crate::scanner::{
    ContentHasher, DocumentClassifier, DocumentKind, HashAlgorithm, SpoolError, SpoolReader,
};

/// Default ceiling on the size of a single file (1 GiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Files at least this large are memory-mapped instead of read (64 MiB).
pub const DEFAULT_MMAP_THRESHOLD: u64 = 64 * 1024 * 1024;

/// Default worker count: one less than the available parallelism, at least 2.
#[must_use]
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map_or(2, NonZeroUsize::get)
        .saturating_sub(1)
        .max(2)
}

/// Per-file failures. None of these stop the scan.
#[derive(thiserror::Error, Debug)]
pub enum FileError {
    /// The file could not be opened, stat'ed or read.
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        /// File path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The file looked like an imaging file but could not be decoded.
    #[error("Cannot decode {path}: {source}")]
    Decode {
        /// File path
        path: PathBuf,
        /// The decoder's error
        #[source]
        source: DecodeError,
    },

    /// Processing panicked; the panic was contained to this file.
    #[error("Processing {path} panicked: {message}")]
    Panicked {
        /// File path
        path: PathBuf,
        /// Panic payload, if it was a string
        message: String,
    },
}

/// What happened to one file.
#[derive(Debug)]
pub enum FileOutcome {
    /// Payload found and hashed.
    Hashed {
        /// Document kind
        kind: DocumentKind,
        /// Hex digest of the payload
        digest: String,
    },
    /// Recognised, but the designated payload is missing or empty.
    NoPayload {
        /// Document kind
        kind: DocumentKind,
    },
    /// Not in the imaging container format.
    NotImaging,
    /// Larger than the configured ceiling; never read.
    TooLarge {
        /// File size in bytes
        size: u64,
    },
    /// Read, decode or processing failure.
    Failed(FileError),
}

/// One `(path, digest | null)` record.
#[derive(Debug)]
pub struct HashRecord {
    /// Path as discovered
    pub path: PathBuf,
    /// Processing result
    pub outcome: FileOutcome,
}

impl HashRecord {
    /// The digest, if the file was hashed.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        match &self.outcome {
            FileOutcome::Hashed { digest, .. } => Some(digest),
            _ => None,
        }
    }
}

/// File contents, either owned or mapped.
enum FileBytes {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Owned(v) => v,
            Self::Mapped(m) => m,
        }
    }
}

/// read → decode → classify → hash for a single file.
pub struct FileProcessor {
    decoder: Arc<dyn FormatDecoder>,
    classifier: DocumentClassifier,
    hasher: ContentHasher,
    max_file_size: u64,
    mmap_threshold: u64,
}

impl std::fmt::Debug for FileProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileProcessor")
            .field("decoder", &"<decoder>")
            .field("classifier", &self.classifier)
            .field("hasher", &self.hasher)
            .field("max_file_size", &self.max_file_size)
            .field("mmap_threshold", &self.mmap_threshold)
            .finish()
    }
}

impl Default for FileProcessor {
    fn default() -> Self {
        Self {
            decoder: Arc::new(Part10Decoder),
            classifier: DocumentClassifier::default(),
            hasher: ContentHasher::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
        }
    }
}

impl FileProcessor {
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

    /// Set the digest algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hasher = ContentHasher::new(algorithm);
        self
    }

    /// Set the per-file size ceiling in bytes.
    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Set the size from which files are memory-mapped.
    #[must_use]
    pub fn with_mmap_threshold(mut self, bytes: u64) -> Self {
        self.mmap_threshold = bytes;
        self
    }

    /// Process one file. Never fails; failures are part of the outcome.
    #[must_use]
    pub fn process(&self, path: &Path) -> FileOutcome {
        let unreadable = |source: io::Error| {
            FileOutcome::Failed(FileError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
        };

        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) => return unreadable(e),
        };
        let size = match file.metadata() {
            Ok(m) => m.len(),
            Err(e) => return unreadable(e),
        };

        if size > self.max_file_size {
            log::debug!(
                "Skipping {} ({} bytes exceeds limit of {})",
                path.display(),
                size,
                self.max_file_size
            );
            return FileOutcome::TooLarge { size };
        }

        let bytes = match self.load(&mut file, size) {
            Ok(Some(b)) => b,
            Ok(None) => {
                log::trace!("Not an imaging file: {}", path.display());
                return FileOutcome::NotImaging;
            }
            Err(e) => return unreadable(e),
        };

        let dataset = match self.decoder.decode(&bytes) {
            Ok(ds) => ds,
            Err(DecodeError::NotDicom) => {
                log::trace!("Not an imaging file: {}", path.display());
                return FileOutcome::NotImaging;
            }
            Err(source) => {
                return FileOutcome::Failed(FileError::Decode {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let classified = self.classifier.classify(dataset.as_ref());
        match classified.payload {
            Some(regions) => FileOutcome::Hashed {
                kind: classified.kind,
                digest: self.hasher.digest_regions(&regions),
            },
            None => {
                log::debug!("No {} payload in {}", classified.kind, path.display());
                FileOutcome::NoPayload {
                    kind: classified.kind,
                }
            }
        }
    }

    /// Read or map the file. `None` when the buffered head already fails the
    /// decoder's signature check.
    fn load(&self, file: &mut File, size: u64) -> io::Result<Option<FileBytes>> {
        if size >= self.mmap_threshold && size > 0 {
            // SAFETY: the mapping is read-only and dropped before this file's
            // record is emitted. A concurrent truncation by another process
            // can still fault, which is the accepted mmap trade-off.
            let map = unsafe { Mmap::map(&*file)? };
            return Ok(Some(FileBytes::Mapped(map)));
        }
        let mut buf = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        let head_len = self.decoder.signature_len() as u64;
        if head_len > 0 {
            file.by_ref().take(head_len).read_to_end(&mut buf)?;
            if !self.decoder.matches_signature(&buf) {
                return Ok(None);
            }
        }
        file.read_to_end(&mut buf)?;
        Ok(Some(FileBytes::Owned(buf)))
    }

    /// Process one file, containing any panic to this file.
    #[must_use]
    pub fn process_isolated(&self, path: PathBuf) -> HashRecord {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.process(&path))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                FileOutcome::Failed(FileError::Panicked {
                    path: path.clone(),
                    message,
                })
            }
        };
        HashRecord { path, outcome }
    }
}

/// Errors that prevent the pool from starting.
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    /// The worker threads could not be spawned.
    #[error("Failed to build worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// How feeding ended.
#[derive(Debug, Default)]
pub struct PoolOutcome {
    /// Paths handed to workers; equals the number of records delivered
    pub submitted: u64,
    /// Feeding stopped because shutdown was requested
    pub interrupted: bool,
    /// Feeding stopped because the spool could not be read
    pub spool_error: Option<SpoolError>,
}

/// Fixed-size pool of file workers.
pub struct WorkerPool {
    concurrency: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("concurrency", &self.concurrency)
            .field("shutdown_flag", &self.shutdown_flag)
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool with `concurrency` workers (minimum 1).
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag. Once set, no further paths are submitted.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Number of workers.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Process every path in `reader`, delivering records to `on_record`.
    ///
    /// `on_record` runs on a single consumer thread, so it may own mutable
    /// state without locking. This call returns after every submitted path
    /// has been delivered.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] only if the worker threads cannot be created.
    pub fn run<F>(
        &self,
        reader: SpoolReader,
        processor: &FileProcessor,
        on_record: F,
    ) -> Result<PoolOutcome, PoolError>
    where
        F: FnMut(HashRecord) + Send,
    {
        // One extra thread for the consumer.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency + 1)
            .thread_name(|i| format!("dicomdupe-worker-{i}"))
            .build()?;

        log::debug!(
            "Processing {} spooled paths with {} workers",
            reader.total(),
            self.concurrency
        );

        let (job_tx, job_rx) = bounded::<PathBuf>(self.concurrency);
        let (result_tx, result_rx) = bounded::<HashRecord>(self.concurrency);

        let outcome = pool.in_place_scope(|scope| {
            for _ in 0..self.concurrency {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move |_| {
                    for path in job_rx.iter() {
                        if result_tx.send(processor.process_isolated(path)).is_err() {
                            break;
                        }
                    }
                });
            }
            // Workers hold the remaining ends; the consumer ends when they do.
            drop(job_rx);
            drop(result_tx);

            let mut on_record = on_record;
            scope.spawn(move |_| {
                for record in result_rx.iter() {
                    on_record(record);
                }
            });

            let outcome = self.feed(reader, &job_tx);
            // Closing the queue lets workers drain it and exit; the scope
            // then joins them and the consumer.
            drop(job_tx);
            outcome
        });

        Ok(outcome)
    }

    fn feed(
        &self,
        reader: SpoolReader,
        job_tx: &crossbeam_channel::Sender<PathBuf>,
    ) -> PoolOutcome {
        let mut outcome = PoolOutcome::default();
        for item in reader {
            if self.is_shutdown_requested() {
                log::debug!("Pool: Shutdown requested, no further files submitted");
                outcome.interrupted = true;
                break;
            }
            match item {
                Ok(path) => {
                    if job_tx.send(path).is_err() {
                        break;
                    }
                    outcome.submitted += 1;
                }
                Err(e) => {
                    log::error!("Failed to read path spool: {e}");
                    outcome.spool_error = Some(e);
                    break;
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::Dataset;
    use crate::scanner::PathSpool;
    use std::io::Write;
    use tempfile::TempDir;

    fn spool_of(paths: &[PathBuf]) -> SpoolReader {
        let mut spool = PathSpool::new().unwrap();
        for p in paths {
            spool.append(p).unwrap();
        }
        spool.into_reader().unwrap()
    }

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(content).unwrap();
        path
    }

    /// Decoder that panics on a marker and otherwise reports not-imaging.
    struct PanickingDecoder;

    impl FormatDecoder for PanickingDecoder {
        fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Box<dyn Dataset + 'a>, DecodeError> {
            if bytes.starts_with(b"boom") {
                panic!("decoder exploded");
            }
            Err(DecodeError::NotDicom)
        }
    }

    /// Decoder that wants an `IMG!` signature and counts decode calls.
    #[derive(Default)]
    struct SignedDecoder {
        decoded: std::sync::atomic::AtomicUsize,
    }

    impl FormatDecoder for SignedDecoder {
        fn decode<'a>(&self, _bytes: &'a [u8]) -> Result<Box<dyn Dataset + 'a>, DecodeError> {
            self.decoded.fetch_add(1, Ordering::SeqCst);
            Err(DecodeError::NotDicom)
        }

        fn signature_len(&self) -> usize {
            4
        }

        fn matches_signature(&self, head: &[u8]) -> bool {
            head == b"IMG!"
        }
    }

    #[test]
    fn test_default_concurrency_floor() {
        assert!(default_concurrency() >= 2);
    }

    #[test]
    fn test_non_imaging_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "notes.txt", b"hello");
        let outcome = FileProcessor::default().process(&path);
        assert!(matches!(outcome, FileOutcome::NotImaging));
    }

    #[test]
    fn test_signature_mismatch_skips_decode() {
        let dir = TempDir::new().unwrap();
        let other = write_file(dir.path(), "report.pdf", &[b'%'; 4096]);
        let signed = write_file(dir.path(), "image", b"IMG!rest of file");
        let decoder = Arc::new(SignedDecoder::default());
        let processor = FileProcessor::default().with_decoder(decoder.clone());

        assert!(matches!(processor.process(&other), FileOutcome::NotImaging));
        assert_eq!(decoder.decoded.load(Ordering::SeqCst), 0);

        assert!(matches!(processor.process(&signed), FileOutcome::NotImaging));
        assert_eq!(decoder.decoded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_short_file_fails_signature() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "IM0001", b"DICM");
        let outcome = FileProcessor::default().process(&path);
        assert!(matches!(outcome, FileOutcome::NotImaging));
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let outcome = FileProcessor::default().process(&dir.path().join("gone.dcm"));
        assert!(matches!(
            outcome,
            FileOutcome::Failed(FileError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_oversized_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "big.dcm", &[0u8; 200]);
        let outcome = FileProcessor::default()
            .with_max_file_size(100)
            .process(&path);
        assert!(matches!(outcome, FileOutcome::TooLarge { size: 200 }));
    }

    #[test]
    fn test_mmap_path_matches_read_path() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "plain.bin", b"not dicom but long enough");
        let mapped = FileProcessor::default().with_mmap_threshold(1).process(&path);
        assert!(matches!(mapped, FileOutcome::NotImaging));
    }

    #[test]
    fn test_panic_becomes_record() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "bad.dcm", b"boom");
        let processor = FileProcessor::default().with_decoder(Arc::new(PanickingDecoder));

        let record = processor.process_isolated(path.clone());
        assert_eq!(record.path, path);
        match record.outcome {
            FileOutcome::Failed(FileError::Panicked { message, .. }) => {
                assert_eq!(message, "decoder exploded");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_every_path_yields_one_record() {
        let dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..50 {
            let content: &[u8] = if i % 7 == 0 { b"boom" } else { b"text" };
            paths.push(write_file(dir.path(), &format!("f{i}"), content));
        }
        paths.push(dir.path().join("missing"));

        let processor = FileProcessor::default().with_decoder(Arc::new(PanickingDecoder));
        for concurrency in [1, 2, 8] {
            let mut seen = Vec::new();
            let outcome = WorkerPool::new(concurrency)
                .run(spool_of(&paths), &processor, |r| seen.push(r.path))
                .unwrap();

            assert_eq!(outcome.submitted, paths.len() as u64);
            assert!(!outcome.interrupted);
            assert!(outcome.spool_error.is_none());
            seen.sort();
            let mut expected = paths.clone();
            expected.sort();
            assert_eq!(seen, expected);
        }
    }

    #[test]
    fn test_shutdown_stops_feeding() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..10)
            .map(|i| write_file(dir.path(), &format!("f{i}"), b"x"))
            .collect();

        let flag = Arc::new(AtomicBool::new(true));
        let mut count = 0;
        let outcome = WorkerPool::new(2)
            .with_shutdown_flag(flag)
            .run(spool_of(&paths), &FileProcessor::default(), |_| count += 1)
            .unwrap();

        assert!(outcome.interrupted);
        assert_eq!(outcome.submitted, 0);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_empty_spool() {
        let mut count = 0;
        let outcome = WorkerPool::new(4)
            .run(spool_of(&[]), &FileProcessor::default(), |_| count += 1)
            .unwrap();
        assert_eq!(outcome.submitted, 0);
        assert_eq!(count, 0);
    }
}
