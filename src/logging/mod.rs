//! Diagnostic logging setup
//!
//! Library code emits `tracing` events; the binary installs a subscriber
//! here. `RUST_LOG` overrides the level picked from the command line.

use tracing_subscriber::EnvFilter;

/// Default filter directive for a verbosity setting.
pub fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    match (verbose, quiet) {
        (true, _) => "dockerpush=debug",
        (false, true) => "error",
        (false, false) => "warn",
    }
}

/// Install the global subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
