//! Tracing configuration for the bincast CLI
//!
//! Logs go to stderr so command output on stdout stays clean. Every session
//! carries a correlation ID.

use std::io;
pub use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Tracing output format, chosen by `--json`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Compact single-line format
    Compact,
    /// Structured JSON format
    Json,
}

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Show all logs (trace level)
    Trace,
    /// Show debug and above
    Debug,
    /// Show info and above
    Info,
    /// Show warnings and above (default)
    Warn,
    /// Show errors only
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Output format
    pub format: TracingFormat,
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Compact,
            level: Level::WARN,
        }
    }
}

impl TracingConfig {
    /// Configuration for the given CLI flags.
    ///
    /// `--verbose` raises a quieter level to `info`; an explicitly louder
    /// `--level` wins.
    #[must_use]
    pub fn from_flags(level: LogLevel, verbose: bool, json: bool) -> Self {
        let mut level = Level::from(level);
        if verbose && level < Level::INFO {
            level = Level::INFO;
        }
        Self {
            format: if json {
                TracingFormat::Json
            } else {
                TracingFormat::Compact
            },
            level,
            ..Default::default()
        }
    }

    /// Filter directive used when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_directive(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        format!("bincast={level},bincast_core={level}")
    }
}

/// Global correlation ID for tracing request correlation
static CORRELATION_ID: std::sync::OnceLock<Uuid> = std::sync::OnceLock::new();

/// Get or create a correlation ID for the current session
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

/// Initialize tracing with the given configuration
pub fn init_tracing(config: &TracingConfig) -> miette::Result<()> {
    let correlation_id = correlation_id();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.default_directive()))
        .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        TracingFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(false)
                .without_time();
            registry.with(layer).try_init()
        }
        TracingFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_span_list(true);
            registry.with(layer).try_init()
        }
    };
    result.map_err(|e| miette::miette!("Failed to install tracing subscriber: {e}"))?;

    tracing::debug!(
        correlation_id = %correlation_id,
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized for bincast CLI"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.default_directive(), "bincast=warn,bincast_core=warn");
    }

    #[test]
    fn test_correlation_id_consistency() {
        let id1 = correlation_id();
        let id2 = correlation_id();
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_verbose_raises_default_level() {
        let config = TracingConfig::from_flags(LogLevel::Warn, true, false);
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.default_directive(), "bincast=info,bincast_core=info");
    }

    #[test]
    fn test_explicit_level_beats_verbose() {
        let config = TracingConfig::from_flags(LogLevel::Trace, true, false);
        assert_eq!(config.level, Level::TRACE);

        let config = TracingConfig::from_flags(LogLevel::Error, false, false);
        assert_eq!(config.default_directive(), "bincast=error,bincast_core=error");
    }

    #[test]
    fn test_json_flag_selects_json_format() {
        let config = TracingConfig::from_flags(LogLevel::Warn, false, true);
        assert_eq!(config.format, TracingFormat::Json);
        assert_eq!(
            TracingConfig::from_flags(LogLevel::Warn, false, false).format,
            TracingFormat::Compact
        );
    }
}
