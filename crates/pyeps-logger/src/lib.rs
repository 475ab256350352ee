//! Diagnostics for the pyeps CLI
//!
//! Everything goes to stderr so stdout carries nothing but results. At the
//! default verbosity only warnings and errors are printed. Library crates
//! log through `tracing`; [`init`] installs the subscriber that renders
//! those events.

use colored::Colorize;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

static VERBOSITY: Mutex<u8> = Mutex::new(0);
static QUIET: Mutex<bool> = Mutex::new(false);

/// Get the current verbosity level
pub fn get_verbosity() -> u8 {
    VERBOSITY.lock().ok().map(|v| *v).unwrap_or(0)
}

/// Whether all console output is suppressed
pub fn is_quiet() -> bool {
    QUIET.lock().ok().map(|v| *v).unwrap_or(false)
}

/// Map verbosity to a `tracing` filter directive
/// 0 = warn only, 1 = debug (-v), 2 = trace (-vv)
pub fn verbosity_to_filter(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "off";
    }
    match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize console logging
///
/// `RUST_LOG` overrides the verbosity-derived filter when set.
pub fn init(verbosity: u8, quiet: bool) -> Result<(), String> {
    if let Ok(mut v) = VERBOSITY.lock() {
        *v = verbosity;
    }
    if let Ok(mut q) = QUIET.lock() {
        *q = quiet;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_to_filter(verbosity, quiet)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init()
        .map_err(|e| format!("Failed to install log subscriber: {}", e))
}

/// Log an informational message (to console if verbose >= 1)
pub fn info(message: &str) {
    if !is_quiet() && get_verbosity() >= 1 {
        eprintln!("{}", message);
    }
}

/// Log a debug message (to console if verbose >= 1)
pub fn debug(message: &str) {
    if !is_quiet() && get_verbosity() >= 1 {
        eprintln!("{} {}", "DEBUG:".blue().bold(), message);
    }
}

/// Log a warning message
pub fn warn(message: &str) {
    if !is_quiet() {
        eprintln!("{} {}", "warning:".yellow().bold(), message);
    }
}

/// Log an error message
///
/// Operation failures are reported through exit codes; the message itself
/// is only shown when verbose so callers never have to parse stderr.
pub fn error(message: &str) {
    if !is_quiet() && get_verbosity() >= 1 {
        eprintln!("{} {}", "Error:".red().bold(), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_to_filter() {
        assert_eq!(verbosity_to_filter(0, false), "warn");
        assert_eq!(verbosity_to_filter(1, false), "debug");
        assert_eq!(verbosity_to_filter(5, false), "trace");
        assert_eq!(verbosity_to_filter(2, true), "off");
    }
}
