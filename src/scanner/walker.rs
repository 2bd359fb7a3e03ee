//! Directory walker streaming discovered files into a [`PathSpool`].
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct, which recursively enumerates
//! a set of root directories and appends every included file to a spool as
//! soon as it is found. Nothing proportional to the tree size is held in
//! memory.
//!
//! # Inclusion rules
//!
//! - Entries whose name starts with `.` are skipped; hidden directories are
//!   not descended into.
//! - [`ScanMode::Filtered`]: only files with no extension, `.dcm` or
//!   `.dicom` (case-insensitive).
//! - [`ScanMode::Deep`]: every regular file.
//!
//! Unreadable directories are recorded as [`ScanError`]s and the walk
//! continues with their siblings.
//!
//! # Example
//!
//! ```no_run
//! use dicomdupe::scanner::{PathSpool, Walker, WalkerConfig};
//! use std::path::PathBuf;
//!
//! let mut spool = PathSpool::new().unwrap();
//! let walker = Walker::new(vec![PathBuf::from("/archive")], WalkerConfig::default());
//! let stats = walker.walk_into(&mut spool).unwrap();
//! for err in &stats.errors {
//!     eprintln!("Warning: {}", err);
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::{DirEntry, WalkDir};

use super::spool::{PathSpool, SpoolError};
use super::{ScanError, ScanMode, WalkerConfig};
use crate::progress::ProgressCallback;

/// Extensions accepted in filtered mode, lowercase.
const IMAGING_EXTENSIONS: &[&str] = &["dcm", "dicom"];

/// Outcome of one walk.
#[derive(Debug, Default)]
pub struct WalkStats {
    /// Files appended to the spool
    pub files_spooled: usize,
    /// Hidden files and directories skipped
    pub skipped_hidden: u64,
    /// Regular files rejected by the extension filter
    pub skipped_extension: u64,
    /// Non-fatal errors (unreadable directories, vanished entries)
    pub errors: Vec<ScanError>,
    /// Whether the walk stopped early because shutdown was requested
    pub interrupted: bool,
}

/// Recursive walker over a set of roots.
pub struct Walker {
    /// Roots to walk, assumed already free of overlap
    roots: Vec<PathBuf>,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for Walker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Walker")
            .field("roots", &self.roots)
            .field("config", &self.config)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Walker {
    /// Create a new walker for the given roots.
    ///
    /// # Arguments
    ///
    /// * `roots` - Root directories to scan
    /// * `config` - Walker configuration options
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, config: WalkerConfig) -> Self {
        Self {
            roots,
            config,
            shutdown_flag: None,
            progress_callback: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, the walker stops before the next entry.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback, notified after every spooled file.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Walk every root, appending included files to `spool`.
    ///
    /// # Errors
    ///
    /// Only spool failures are returned; per-entry problems end up in
    /// [`WalkStats::errors`].
    pub fn walk_into(&self, spool: &mut PathSpool) -> Result<WalkStats, SpoolError> {
        let mut stats = WalkStats::default();

        for root in &self.roots {
            if self.is_shutdown_requested() {
                stats.interrupted = true;
                break;
            }
            log::debug!("Walking {}", root.display());
            self.walk_root(root, spool, &mut stats)?;
        }

        log::info!(
            "Discovered {} files ({} hidden skipped, {} filtered by extension, {} errors)",
            stats.files_spooled,
            stats.skipped_hidden,
            stats.skipped_extension,
            stats.errors.len()
        );

        Ok(stats)
    }

    fn walk_root(
        &self,
        root: &Path,
        spool: &mut PathSpool,
        stats: &mut WalkStats,
    ) -> Result<(), SpoolError> {
        let mut skipped_hidden = 0u64;
        let entries = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                // The root itself is always walked, even if its name is dotted.
                if entry.depth() > 0 && is_hidden(entry) {
                    log::trace!("Skipping hidden entry: {}", entry.path().display());
                    skipped_hidden += 1;
                    return false;
                }
                true
            });

        for result in entries {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                stats.interrupted = true;
                break;
            }

            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    stats.errors.push(handle_walk_error(root, e));
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            if !file_type.is_file() {
                log::trace!("Skipping non-regular entry: {}", entry.path().display());
                continue;
            }

            if !self.includes(entry.path()) {
                log::trace!("Skipping by extension: {}", entry.path().display());
                stats.skipped_extension += 1;
                continue;
            }

            spool.append(entry.path())?;
            stats.files_spooled += 1;

            if let Some(ref callback) = self.progress_callback {
                callback.on_progress(stats.files_spooled, &entry.path().to_string_lossy());
            }
        }

        stats.skipped_hidden += skipped_hidden;
        Ok(())
    }

    /// Apply the mode's inclusion rule to a regular file.
    fn includes(&self, path: &Path) -> bool {
        match self.config.mode {
            ScanMode::Deep => true,
            ScanMode::Filtered => has_imaging_extension(path),
        }
    }
}

/// Whether a file name marks a hidden entry.
fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().as_encoded_bytes().first() == Some(&b'.')
}

/// Whether `path` has no extension or an imaging extension.
#[must_use]
pub fn has_imaging_extension(path: &Path) -> bool {
    match path.extension() {
        None => true,
        Some(ext) => {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            ext.is_empty() || IMAGING_EXTENSIONS.contains(&ext.as_str())
        }
    }
}

/// Convert a walkdir error into a [`ScanError`].
fn handle_walk_error(root: &Path, error: walkdir::Error) -> ScanError {
    let path = error
        .path()
        .map_or_else(|| root.to_path_buf(), Path::to_path_buf);

    if error.loop_ancestor().is_some() {
        log::warn!("Symlink loop: {}", path.display());
        return ScanError::SymlinkLoop(path);
    }

    match error.io_error().map(io::Error::kind) {
        Some(io::ErrorKind::PermissionDenied) => {
            log::warn!("Permission denied: {}", path.display());
            ScanError::PermissionDenied(path)
        }
        Some(io::ErrorKind::NotFound) => {
            log::debug!("Entry vanished during walk: {}", path.display());
            ScanError::NotFound(path)
        }
        _ => {
            log::warn!("Walker error for {}: {}", path.display(), error);
            ScanError::Io {
                path,
                source: io::Error::from(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    /// Create a test tree mixing imaging, hidden and other files.
    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        for name in ["IM0001", "scan.dcm", "SCAN2.DICOM", "notes.txt", ".hidden.dcm"] {
            let mut f = File::create(root.join(name)).unwrap();
            writeln!(f, "{name}").unwrap();
        }

        let series = root.join("series");
        fs::create_dir(&series).unwrap();
        File::create(series.join("slice.dcm")).unwrap();

        let hidden_dir = root.join(".cache");
        fs::create_dir(&hidden_dir).unwrap();
        File::create(hidden_dir.join("cached.dcm")).unwrap();

        dir
    }

    fn walk(root: &Path, mode: ScanMode) -> (Vec<PathBuf>, WalkStats) {
        let mut spool = PathSpool::new().unwrap();
        let walker = Walker::new(vec![root.to_path_buf()], WalkerConfig::new(mode, false));
        let stats = walker.walk_into(&mut spool).unwrap();
        let paths = spool.into_reader().unwrap().map(Result::unwrap).collect();
        (paths, stats)
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        let mut names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_filtered_mode() {
        let dir = create_test_dir();
        let (paths, stats) = walk(dir.path(), ScanMode::Filtered);

        assert_eq!(names(&paths), vec!["IM0001", "SCAN2.DICOM", "scan.dcm", "slice.dcm"]);
        assert_eq!(stats.files_spooled, 4);
        assert_eq!(stats.skipped_extension, 1);
        assert_eq!(stats.skipped_hidden, 2);
        assert!(stats.errors.is_empty());
    }

    #[test]
    fn test_deep_mode_includes_any_extension() {
        let dir = create_test_dir();
        let (paths, stats) = walk(dir.path(), ScanMode::Deep);

        assert_eq!(
            names(&paths),
            vec!["IM0001", "SCAN2.DICOM", "notes.txt", "scan.dcm", "slice.dcm"]
        );
        assert_eq!(stats.skipped_extension, 0);
    }

    #[test]
    fn test_hidden_never_included() {
        let dir = create_test_dir();
        for mode in [ScanMode::Filtered, ScanMode::Deep] {
            let (paths, _) = walk(dir.path(), mode);
            assert!(paths
                .iter()
                .all(|p| !p.to_string_lossy().contains(".hidden")
                    && !p.to_string_lossy().contains(".cache")));
        }
    }

    #[test]
    fn test_paths_are_under_root() {
        let dir = create_test_dir();
        let (paths, _) = walk(dir.path(), ScanMode::Deep);
        assert!(paths.iter().all(|p| p.starts_with(dir.path())));
    }

    #[test]
    fn test_shutdown_stops_walk() {
        let dir = create_test_dir();
        let flag = Arc::new(AtomicBool::new(true));
        let mut spool = PathSpool::new().unwrap();
        let walker = Walker::new(vec![dir.path().to_path_buf()], WalkerConfig::default())
            .with_shutdown_flag(flag);

        let stats = walker.walk_into(&mut spool).unwrap();
        assert!(stats.interrupted);
        assert_eq!(stats.files_spooled, 0);
    }

    #[test]
    fn test_missing_root_is_recorded() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");
        let (paths, stats) = walk(&missing, ScanMode::Deep);
        assert!(paths.is_empty());
        assert_eq!(stats.errors.len(), 1);
        assert!(matches!(stats.errors[0], ScanError::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_recorded_and_walk_continues() {
        let dir = create_test_dir();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("series").join("back")).unwrap();

        let mut spool = PathSpool::new().unwrap();
        let walker = Walker::new(
            vec![dir.path().to_path_buf()],
            WalkerConfig::new(ScanMode::Filtered, true),
        );
        let stats = walker.walk_into(&mut spool).unwrap();

        assert_eq!(stats.files_spooled, 4);
        assert_eq!(stats.errors.len(), 1);
        assert!(matches!(stats.errors[0], ScanError::SymlinkLoop(_)));
        assert!(!stats.interrupted);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_does_not_abort() {
        use std::os::unix::fs::PermissionsExt;

        let dir = create_test_dir();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        File::create(locked.join("inside.dcm")).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let readable = fs::read_dir(&locked).is_ok();

        let (paths, stats) = walk(dir.path(), ScanMode::Filtered);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        if readable {
            eprintln!("skipped: permission bits are not enforced for this user");
            return;
        }
        assert_eq!(paths.len(), 4);
        assert_eq!(stats.errors.len(), 1);
        assert!(matches!(stats.errors[0], ScanError::PermissionDenied(_)));
    }

    #[test]
    fn test_has_imaging_extension() {
        assert!(has_imaging_extension(Path::new("/a/IM0001")));
        assert!(has_imaging_extension(Path::new("/a/x.dcm")));
        assert!(has_imaging_extension(Path::new("/a/x.DcM")));
        assert!(has_imaging_extension(Path::new("/a/x.dicom")));
        assert!(has_imaging_extension(Path::new("/a/x.")));
        assert!(!has_imaging_extension(Path::new("/a/x.txt")));
        assert!(!has_imaging_extension(Path::new("/a/x.dcm.bak")));
    }
}
