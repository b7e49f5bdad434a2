//! CLI error types, exit codes and error rendering
//!
//! Library errors are folded into a few user-facing categories, each with a
//! miette diagnostic code and, where there is something useful to say, help
//! text.

use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use thiserror::Error;

use crate::shutdown::EXIT_SIGINT;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// Any failure
pub const EXIT_FAILURE: i32 = 1;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// Bad arguments or local configuration
    #[error("{message}")]
    #[diagnostic(code(bincast::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// The registry refused, lacked, or returned bad content
    #[error("{message}")]
    #[diagnostic(code(bincast::cli::registry))]
    Registry {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Local failure (cache, filesystem, launching the binary)
    #[error("{message}")]
    #[diagnostic(code(bincast::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Interrupted by Ctrl-C
    #[error("Interrupted")]
    #[diagnostic(code(bincast::cli::cancelled))]
    Cancelled,
    /// The executed binary exited unsuccessfully; its code is passed through
    #[error("Binary exited with code {code}")]
    #[diagnostic(code(bincast::cli::exit))]
    Exit {
        /// The binary's exit code
        code: i32,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new registry error
    #[must_use]
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new registry error with help text
    #[must_use]
    pub fn registry_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error with help text
    #[must_use]
    pub fn other_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Short category name used in JSON output
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Registry { .. } => "registry",
            Self::Other { .. } => "other",
            Self::Cancelled => "cancelled",
            Self::Exit { .. } => "exit",
        }
    }
}

/// Convert `bincast_core::Error` to the matching `CliError` category.
impl From<bincast_core::Error> for CliError {
    fn from(err: bincast_core::Error) -> Self {
        use bincast_core::Error;

        let message = err.to_string();
        match err {
            Error::InvalidReference(..) => Self::config_with_help(
                message,
                "References look like registry.example.com/repository:tag",
            ),
            Error::InvalidPlatform(_) => {
                Self::config_with_help(message, "Platforms look like linux/amd64")
            }
            Error::InvalidBinding { .. } | Error::MissingBinding => Self::config_with_help(
                message,
                "Bind each binary as --bin os/arch=path, e.g. --bin linux/amd64=./bin/app",
            ),
            Error::DuplicatePlatform(_) => {
                Self::config_with_help(message, "Pass each platform to --bin only once")
            }
            Error::OutputRequired => Self::config(message),
            Error::PlatformNotAvailable { reference, .. } => Self::registry_with_help(
                message,
                format!("Run 'bincast list {reference}' to see the available platforms"),
            ),
            Error::Registry { .. } | Error::PushFailed { .. } if is_auth_failure(&message) => {
                Self::registry_with_help(
                    message,
                    "Pass --username and --password, or log in with 'docker login'",
                )
            }
            Error::UnsupportedMediaType(_)
            | Error::EmptyManifest(_)
            | Error::DigestMismatch { .. }
            | Error::NotFound(_)
            | Error::AlreadyExists(_)
            | Error::Registry { .. }
            | Error::PushFailed { .. }
            | Error::Json(_) => Self::registry(message),
            Error::Cancelled => Self::Cancelled,
            Error::NonZeroExit { code } => Self::Exit { code },
            Error::BinaryNotFound(_) | Error::Launch { .. } => Self::other_with_help(
                message,
                "Run again with --no-cache to download the binary afresh",
            ),
            Error::Io(_) => Self::other_with_help(
                message,
                "Check file permissions and ensure the path exists",
            ),
            Error::Cache(_) => Self::other_with_help(
                message,
                "Check that the cache directory (--cache-dir) is writable",
            ),
        }
    }
}

fn is_auth_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("401") || lower.contains("unauthorized") || lower.contains("denied")
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } | CliError::Registry { .. } | CliError::Other { .. } => {
            EXIT_FAILURE
        }
        CliError::Cancelled => EXIT_SIGINT,
        CliError::Exit { code } => *code,
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Render error appropriately based on JSON flag
///
/// A passed-through exit code is not an error of ours, so nothing is printed
/// for it.
pub fn render_error(err: &CliError, json_mode: bool) {
    if matches!(err, CliError::Exit { .. }) {
        return;
    }

    if json_mode {
        let envelope = ErrorEnvelope::new(serde_json::json!({
            "code": err.category(),
            "message": err.to_string(),
        }));
        match serde_json::to_string(&envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}
