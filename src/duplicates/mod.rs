//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Bounded-concurrency classification and hashing of spooled paths
//! - Aggregation of digests into duplicate groups and counters
//! - The finder tying walk, spool, pool and aggregation together

pub mod finder;
pub mod groups;
pub mod pool;

pub use finder::{DuplicateFinder, FinderConfig, FinderError};
pub use groups::{DuplicateGroup, HashAggregator, ScanCounters, ScanReport};
pub use pool::{
    default_concurrency, FileError, FileOutcome, FileProcessor, HashRecord, PoolError,
    PoolOutcome, WorkerPool, DEFAULT_MAX_FILE_SIZE, DEFAULT_MMAP_THRESHOLD,
};
