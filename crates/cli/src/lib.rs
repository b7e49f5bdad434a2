//! bincast command line interface
//!
//! Push, pull, run and list multi-architecture binaries stored in OCI
//! registries. The heavy lifting lives in `bincast_core`; this crate parses
//! arguments, renders output and maps failures to exit codes.

// CLI output goes to stdout/stderr on purpose
#![allow(clippy::print_stdout, clippy::print_stderr)]

/// CLI argument parsing.
pub mod cli;
/// Command implementations.
pub mod commands;
/// Error categories, exit codes and rendering.
pub mod errors;
/// Ctrl-C handling.
pub mod shutdown;
/// Tracing and logging configuration.
pub mod tracing;

pub use cli::{Cli, Commands, parse};
pub use errors::{CliError, EXIT_FAILURE, EXIT_OK, OkEnvelope, exit_code_for, render_error};
