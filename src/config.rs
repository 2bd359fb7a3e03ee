//! Layered application configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. A TOML file: `--config FILE`, or `config.toml` in the platform
//!    configuration directory when present
//! 3. Environment variables prefixed with `DICOMDUPE_` (e.g.
//!    `DICOMDUPE_MAX_FILE_SIZE=536870912`)
//! 4. Command-line flags
//!
//! ```toml
//! concurrency = 6
//! max_file_size = 2147483648
//! deep = false
//! hash_algorithm = "sha256"
//! spool_dir = "/scratch/dicomdupe"
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cli::ScanArgs;
use crate::duplicates::{FinderConfig, DEFAULT_MAX_FILE_SIZE};
use crate::scanner::{HashAlgorithm, ScanMode, WalkerConfig};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DICOMDUPE_";

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    /// A source could not be parsed or has the wrong shape.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending setting
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Files processed concurrently; `None` picks from available CPUs.
    pub concurrency: Option<usize>,
    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,
    /// Inspect every file instead of filtering by extension.
    pub deep: bool,
    /// How many error messages are surfaced.
    pub error_report_limit: usize,
    /// Digest algorithm.
    pub hash_algorithm: HashAlgorithm,
    /// Where the path spool is created.
    pub spool_dir: Option<PathBuf>,
    /// Follow symbolic links during the walk.
    pub follow_symlinks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            deep: false,
            error_report_limit: 10,
            hash_algorithm: HashAlgorithm::default(),
            spool_dir: None,
            follow_symlinks: false,
        }
    }
}

impl Config {
    /// Platform configuration file path, if a home directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "dicomdupe", "dicomdupe")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The layered figment without CLI overrides.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match file {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                if let Some(path) = Self::default_path() {
                    log::debug!("Looking for configuration at {}", path.display());
                    figment = figment.merge(Toml::file(path));
                }
            }
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load defaults, file and environment, then validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit file is missing, a source does
    /// not parse, or a value is out of range.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = file {
            if !path.is_file() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
        }
        Self::from_figment(&Self::figment(file))
    }

    /// Extract and validate from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on parse or validation failure.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides and re-validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a flag value is out of range.
    pub fn merge_scan_args(mut self, args: &ScanArgs) -> Result<Self, ConfigError> {
        if let Some(n) = args.concurrency {
            self.concurrency = Some(n);
        }
        if let Some(bytes) = args.max_size {
            self.max_file_size = bytes;
        }
        if let Some(algorithm) = args.algorithm {
            self.hash_algorithm = algorithm;
        }
        if let Some(ref dir) = args.spool_dir {
            self.spool_dir = Some(dir.clone());
        }
        if let Some(limit) = args.error_limit {
            self.error_report_limit = limit;
        }
        self.deep |= args.deep;
        self.follow_symlinks |= args.follow_symlinks;
        self.validate()?;
        Ok(self)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero concurrency or size limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == Some(0) {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                reason: "must be at least 1",
            });
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_file_size",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Finder configuration for these settings.
    #[must_use]
    pub fn finder_config(&self) -> FinderConfig {
        let mode = if self.deep {
            ScanMode::Deep
        } else {
            ScanMode::Filtered
        };
        let mut config = FinderConfig::default()
            .with_max_file_size(self.max_file_size)
            .with_hash_algorithm(self.hash_algorithm)
            .with_walker_config(WalkerConfig::new(mode, self.follow_symlinks))
            .with_error_report_limit(self.error_report_limit);
        if let Some(n) = self.concurrency {
            config = config.with_concurrency(n);
        }
        if let Some(ref dir) = self.spool_dir {
            config = config.with_spool_dir(dir.clone());
        }
        config
    }
}
