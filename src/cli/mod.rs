//! Command line interface module
//!
//! Argument parsing and the runner that drives a single push.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::Runner;
