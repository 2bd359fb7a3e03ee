//! Command-line interface definitions.
//!
//! ```bash
//! # Scan two archives, extension-filtered, human-readable report
//! dicomdupe scan /archive/2023 /archive/2024
//!
//! # Inspect every file by content and emit line-delimited JSON
//! dicomdupe scan /archive --deep --output json-lines
//!
//! # Limit concurrency and skip files above 512 MiB
//! dicomdupe -v scan /archive --concurrency 4 --max-size 512MiB
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::scanner::HashAlgorithm;

/// Find duplicate medical images by the content that defines them.
///
/// Files are compared by their pixel data (or the equivalent payload for
/// documents, reports, RT structure sets and waveforms), so copies with
/// different metadata are still reported as duplicates.
#[derive(Debug, Parser)]
#[command(name = "dicomdupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (TOML); defaults to the platform config directory
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan directories for duplicate images
    Scan(ScanArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Root directories to scan; nested roots are scanned once
    #[arg(value_name = "ROOT", required = true, num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Consider every file, not only those without extension or with .dcm/.dicom
    #[arg(long)]
    pub deep: bool,

    /// Number of files processed concurrently (default: CPUs - 1, at least 2)
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Skip files larger than this (e.g., 512MiB, 2GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Digest algorithm
    #[arg(long, value_enum, value_name = "ALGORITHM")]
    pub algorithm: Option<HashAlgorithm>,

    /// Directory for the temporary path spool
    #[arg(long, value_name = "DIR")]
    pub spool_dir: Option<PathBuf>,

    /// Follow symbolic links during the walk
    #[arg(long)]
    pub follow_symlinks: bool,

    /// How many error messages to show
    #[arg(long, value_name = "N")]
    pub error_limit: Option<usize>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// One pretty-printed JSON document
    Json,
    /// One JSON object per line: groups, then a summary
    JsonLines,
}

/// Parse a human-readable size string into bytes.
///
/// Decimal suffixes (KB, MB, ...) are powers of 1000, binary ones (KiB,
/// MiB, ...) powers of 1024. Suffixes are case-insensitive.
///
/// # Errors
///
/// Returns a message for empty input, bad numbers and unknown suffixes.
///
/// # Examples
///
/// ```
/// use dicomdupe::cli::parse_size;
///
/// assert_eq!(parse_size("512MiB").unwrap(), 512 * 1024 * 1024);
/// assert_eq!(parse_size("1.5KB").unwrap(), 1500);
/// ```
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_ascii_uppercase()),
        None => (s, String::new()),
    };

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1 << 10,
        "MB" | "M" => 1_000_000,
        "MIB" => 1 << 20,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1 << 30,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1 << 40,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    if let Ok(whole) = num_str.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Size too large: '{s}'"));
    }

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;
    Ok((num * multiplier as f64) as u64)
}
