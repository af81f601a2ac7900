//! Command-line interface for uroboros.
//!
//! Loads the configuration, starts the workers and serves HTTP until the
//! process is interrupted.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
