//! Signal handling for graceful shutdown
//!
//! Provides Ctrl+C handling with two-phase shutdown:
//! - First Ctrl+C: Set interrupted flag, the running analysis degrades and
//!   the fail-safe decision is still written
//! - Second Ctrl+C: Force exit with code 130

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit codes for CLI commands
#[repr(i32)]
pub enum ExitCode {
    /// `packages` found nothing
    NoPackages = 2,
    /// Change set could not be collected
    CollectionFailed = 3,
    /// User interrupted with Ctrl+C
    Interrupted = 130,
}

/// Global flag indicating user requested interruption
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install Ctrl+C handler for graceful shutdown
///
/// First Ctrl+C sets INTERRUPTED and `cancel`, which the controller polls.
/// Second Ctrl+C force-exits with code 130.
pub fn setup_signal_handler(cancel: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        if INTERRUPTED.swap(true, Ordering::AcqRel) {
            // Second Ctrl+C: force exit
            std::process::exit(ExitCode::Interrupted as i32);
        }
        cancel.store(true, Ordering::Release);
        eprintln!("\nInterrupted. Writing fail-safe decision...");
    }) {
        tracing::warn!(error = %e, "Failed to set Ctrl+C handler");
    }
}

/// Check if user requested interruption via Ctrl+C
pub fn check_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Acquire)
}
