//! Cancellation via Ctrl+C and termination signals.
//!
//! A single [`ShutdownHandler`] owns an `AtomicBool` that the walker, the
//! pool feeder and the finder poll. Setting it never kills work in flight:
//! files already being hashed finish, no new ones are started, and the
//! partial report is marked interrupted.
//!
//! The path spool needs no signal-time cleanup. Its backing file is
//! anonymous, so the operating system reclaims it however the process ends.
//!
//! ```rust,no_run
//! use dicomdupe::duplicates::FinderConfig;
//! use dicomdupe::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! let config = FinderConfig::default().with_shutdown_flag(handler.get_flag());
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared shutdown flag.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested and no signal hook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once a signal arrived or [`request_shutdown`](Self::request_shutdown) was called.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request shutdown programmatically.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The flag to hand to [`FinderConfig::with_shutdown_flag`].
    ///
    /// [`FinderConfig::with_shutdown_flag`]: crate::duplicates::FinderConfig::with_shutdown_flag
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag so the handler can drive another scan.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the process-wide signal hook and return its handler.
///
/// Handles SIGINT, and with the `termination` feature of `ctrlc` also
/// SIGTERM and SIGHUP. Later calls in the same process return the first
/// handler with its flag cleared, so `run_app` can be called repeatedly
/// (as integration tests do).
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if the hook cannot be registered
/// and no handler was installed earlier by this module.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    let installed = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(
            std::io::stderr(),
            "\nInterrupted. Finishing files in progress..."
        );
        log::info!("Shutdown signal received");
    });

    match installed {
        Ok(()) => Ok(GLOBAL_HANDLER.get_or_init(|| handler).clone()),
        // Another thread won the race; its handler is the registered one.
        Err(ctrlc::Error::MultipleHandlers) => match GLOBAL_HANDLER.get() {
            Some(existing) => Ok(existing.clone()),
            None => {
                log::debug!("Signal hook owned elsewhere, using an unhooked handler");
                Ok(GLOBAL_HANDLER.get_or_init(|| handler).clone())
            }
        },
        Err(e) => Err(SignalError::InstallFailed(e)),
    }
}
