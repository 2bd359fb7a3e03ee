//! Append-then-stream spill storage for discovered paths.
//!
//! # Overview
//!
//! Discovery and processing are decoupled through an external list so that
//! memory use does not grow with the number of files in the tree:
//!
//! 1. [`PathSpool`] is written by the walker, one record per file, as files
//!    are found.
//! 2. [`PathSpool::into_reader`] consumes the writer and returns a
//!    [`SpoolReader`] that streams the records back in discovery order.
//!
//! The type-state split means the two phases can never overlap for a single
//! spool: there is exactly one writer, then exactly one reader.
//!
//! # Storage
//!
//! Records live in an anonymous temporary file (`tempfile::tempfile`). On
//! Unix the file is unlinked at creation, on Windows it is opened
//! delete-on-close, so its storage is reclaimed when the handle is dropped
//! or the process dies for any reason.
//!
//! Each record is a little-endian `u32` byte length followed by the raw
//! path bytes.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Errors raised by spool storage.
#[derive(thiserror::Error, Debug)]
pub enum SpoolError {
    /// The backing file could not be created, written or read.
    #[error("Spool I/O error: {0}")]
    Io(#[from] io::Error),

    /// The path cannot be stored on this platform.
    #[error("Path is not valid Unicode: {0}")]
    NonUnicodePath(PathBuf),

    /// A path is longer than a record can describe.
    #[error("Path of {0} bytes is too long to spool")]
    PathTooLong(usize),

    /// A record could not be decoded.
    #[error("Spool record {record} is corrupt")]
    Corrupt {
        /// Zero-based index of the bad record
        record: u64,
    },
}

/// Writer half of the spool.
#[derive(Debug)]
pub struct PathSpool {
    writer: BufWriter<File>,
    len: u64,
}

impl PathSpool {
    /// Create a spool in the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Io`] if the temporary file cannot be created.
    pub fn new() -> Result<Self, SpoolError> {
        Ok(Self::from_file(tempfile::tempfile()?))
    }

    /// Create a spool inside `dir`.
    ///
    /// Useful when the system temporary directory is small and the archive
    /// has millions of files.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Io`] if the temporary file cannot be created.
    pub fn new_in(dir: &Path) -> Result<Self, SpoolError> {
        Ok(Self::from_file(tempfile::tempfile_in(dir)?))
    }

    fn from_file(file: File) -> Self {
        log::debug!("Created path spool");
        Self {
            writer: BufWriter::new(file),
            len: 0,
        }
    }

    /// Append one path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be encoded or the write fails.
    pub fn append(&mut self, path: &Path) -> Result<(), SpoolError> {
        let bytes = encode_path(path)?;
        let len = u32::try_from(bytes.len()).map_err(|_| SpoolError::PathTooLong(bytes.len()))?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(bytes)?;
        self.len += 1;
        Ok(())
    }

    /// Number of paths written so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether no path has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finish writing and rewind for sequential reading.
    ///
    /// # Errors
    ///
    /// Returns [`SpoolError::Io`] if buffered records cannot be flushed.
    pub fn into_reader(self) -> Result<SpoolReader, SpoolError> {
        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        Ok(SpoolReader {
            reader: BufReader::new(file),
            total: self.len,
            read: 0,
        })
    }
}

/// Reader half of the spool; yields paths in discovery order.
#[derive(Debug)]
pub struct SpoolReader {
    reader: BufReader<File>,
    total: u64,
    read: u64,
}

impl SpoolReader {
    /// Total number of records in the spool.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    fn read_record(&mut self) -> Result<PathBuf, SpoolError> {
        let mut len = [0u8; 4];
        self.reader.read_exact(&mut len)?;
        let mut buf = vec![0u8; u32::from_le_bytes(len) as usize];
        self.reader.read_exact(&mut buf)?;
        decode_path(buf).ok_or(SpoolError::Corrupt { record: self.read })
    }
}

impl Iterator for SpoolReader {
    type Item = Result<PathBuf, SpoolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.read >= self.total {
            return None;
        }
        let record = self.read_record();
        if record.is_err() {
            // A broken record makes the rest of the stream unaligned.
            self.read = self.total;
        } else {
            self.read += 1;
        }
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.total - self.read).unwrap_or(usize::MAX);
        (0, Some(left))
    }
}

#[cfg(unix)]
fn encode_path(path: &Path) -> Result<&[u8], SpoolError> {
    use std::os::unix::ffi::OsStrExt;
    Ok(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn encode_path(path: &Path) -> Result<&[u8], SpoolError> {
    path.to_str()
        .map(str::as_bytes)
        .ok_or_else(|| SpoolError::NonUnicodePath(path.to_path_buf()))
}

#[cfg(unix)]
fn decode_path(bytes: Vec<u8>) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStringExt;
    Some(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn decode_path(bytes: Vec<u8>) -> Option<PathBuf> {
    String::from_utf8(bytes).ok().map(PathBuf::from)
}
