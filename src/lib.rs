//! dicomdupe - duplicate detection for medical imaging archives
//!
//! Walks directory trees with bounded memory, decodes each candidate file,
//! picks the payload that defines it (pixel data, an encapsulated document,
//! report content, RT structures or waveform samples) and groups files whose
//! payload digests match. Metadata differences such as patient identifiers
//! or timestamps do not keep two copies of the same image apart.
//!
//! The pipeline is available as a library through
//! [`duplicates::DuplicateFinder`]; [`run_app`] is the command-line driver.

pub mod cli;
pub mod config;
pub mod dicom;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;

use crate::cli::{Cli, Commands, OutputFormat, ScanArgs};
use crate::config::Config;
use crate::duplicates::DuplicateFinder;
use crate::error::ExitCode;
use crate::progress::Progress;

/// Run the application and write the report to stdout.
///
/// # Errors
///
/// Returns an error for fatal problems: invalid configuration, a root that
/// does not exist, spool failure, an interrupt before scanning started, or a
/// report that cannot be written. Per-file failures are not errors here; they
/// show up as [`ExitCode::PartialSuccess`].
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    run_app_with_writer(cli, &mut handle)
}

/// Run the application, writing the report to `writer`.
///
/// # Errors
///
/// See [`run_app`].
pub fn run_app_with_writer<W: Write>(cli: Cli, writer: &mut W) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Scan(ref args) => {
            let config = config
                .merge_scan_args(args)
                .context("Invalid command-line options")?;
            run_scan(&cli, args, &config, writer)
        }
    }
}

fn run_scan<W: Write>(
    cli: &Cli,
    args: &ScanArgs,
    config: &Config,
    writer: &mut W,
) -> anyhow::Result<ExitCode> {
    let handler = signal::install_handler().context("Failed to install signal handler")?;

    let mut finder_config = config.finder_config().with_shutdown_flag(handler.get_flag());
    if args.output == OutputFormat::Text && !cli.quiet {
        finder_config = finder_config.with_progress_callback(Arc::new(Progress::new(false)));
    }

    log::debug!(
        "Scanning {} root(s) with concurrency {}, {} mode, {}",
        args.paths.len(),
        finder_config.concurrency,
        if config.deep { "deep" } else { "filtered" },
        config.hash_algorithm
    );

    let finder = DuplicateFinder::new(finder_config);
    let report = finder
        .find_duplicates_in_paths(args.paths.clone())
        .context("Scan failed")?;

    let exit_code = ExitCode::from_report(&report);
    output::write_report(writer, args.output, &report, exit_code)
        .context("Failed to write report")?;
    writer.flush().context("Failed to write report")?;

    log::info!(
        "Scanned {} file(s): {} duplicate set(s), {} redundant file(s), {} error(s)",
        report.counters.files_seen,
        report.duplicate_groups.len(),
        report.counters.redundant_files,
        report.counters.errors
    );
    Ok(exit_code)
}
