//! Error types for bincast operations.

use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for bincast operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while packaging, resolving, caching or running binaries.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse an artifact reference.
    #[error("Invalid reference '{0}': {1}")]
    InvalidReference(String, String),

    /// Platform string is not of the form `os/arch`.
    #[error("Invalid platform '{0}' (expected os/arch)")]
    InvalidPlatform(String),

    /// A push binding is malformed or points at an unreadable file.
    #[error("Invalid binding '{binding}': {message}")]
    InvalidBinding {
        /// The binding as given.
        binding: String,
        /// What is wrong with it.
        message: String,
    },

    /// Push was invoked without any binaries.
    #[error("No binaries specified, use --bin os/arch=path")]
    MissingBinding,

    /// The same platform was bound to more than one binary.
    #[error("Platform '{0}' is bound more than once")]
    DuplicatePlatform(String),

    /// Pull without caching needs somewhere to put the binary.
    #[error("Output path required when caching is disabled")]
    OutputRequired,

    /// Top-level artifact is neither an index nor a manifest.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Platform not available for the artifact.
    #[error("Platform '{platform}' not available for '{reference}'")]
    PlatformNotAvailable {
        /// The artifact reference.
        reference: String,
        /// The requested platform.
        platform: String,
    },

    /// Manifest without any layer to treat as the binary.
    #[error("Manifest {0} has no layers")]
    EmptyManifest(String),

    /// Digest mismatch after download.
    #[error("Digest mismatch for blob: expected {expected}, got {actual}")]
    DigestMismatch {
        /// The expected digest.
        expected: String,
        /// The computed digest.
        actual: String,
    },

    /// Reference or content unknown to the registry.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Content is already present at the destination.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Transport or protocol failure reported by the registry client.
    #[error("Registry error during {operation}: {message}")]
    Registry {
        /// The operation that failed.
        operation: String,
        /// Error message.
        message: String,
    },

    /// A single platform of a multi-platform push failed.
    #[error("Failed to push binary {platform}: {cause}")]
    PushFailed {
        /// The platform being pushed.
        platform: String,
        /// The underlying failure.
        cause: Box<Error>,
    },

    /// The operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Cache operation failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Binary to execute does not exist.
    #[error("Binary not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    /// Executed binary exited unsuccessfully.
    #[error("Binary exited with code {code}")]
    NonZeroExit {
        /// The exit code.
        code: i32,
    },

    /// Binary could not be started.
    #[error("Failed to launch {}: {source}", path.display())]
    Launch {
        /// The binary path.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid reference error.
    #[must_use]
    pub fn invalid_reference(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidReference(reference.into(), message.into())
    }

    /// Create an invalid binding error.
    #[must_use]
    pub fn invalid_binding(binding: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidBinding {
            binding: binding.into(),
            message: message.into(),
        }
    }

    /// Create a platform not available error.
    #[must_use]
    pub fn platform_not_available(reference: impl Into<String>, platform: impl Display) -> Self {
        Self::PlatformNotAvailable {
            reference: reference.into(),
            platform: platform.to_string(),
        }
    }

    /// Create a digest mismatch error.
    #[must_use]
    pub fn digest_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DigestMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Wrap a failure with the platform whose push it aborted.
    #[must_use]
    pub fn push_failed(platform: impl Display, cause: Self) -> Self {
        Self::PushFailed {
            platform: platform.to_string(),
            cause: Box::new(cause),
        }
    }

    /// Translate a registry client failure.
    ///
    /// Registries report duplicate uploads only through the message text, so
    /// "already exists" is recognised here and surfaced as [`Error::AlreadyExists`].
    #[must_use]
    pub fn registry(operation: impl Into<String>, err: impl Display) -> Self {
        let message = err.to_string();
        if message.to_lowercase().contains("already exists") {
            return Self::AlreadyExists(message);
        }
        Self::Registry {
            operation: operation.into(),
            message,
        }
    }

    /// Whether the failure only says the content is already present.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::AlreadyExists(_) => true,
            Self::PushFailed { cause, .. } => cause.is_already_exists(),
            _ => false,
        }
    }
}
