//! Command line definition.

use bincast_core::{Options, Platform};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::PathBuf;

use crate::tracing::LogLevel;

/// Top-level command line.
#[derive(Parser, Debug)]
#[command(name = "bincast")]
#[command(about = "Push, pull and run multi-architecture binaries stored in OCI registries")]
#[command(long_about = None)]
#[command(version)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// The command to run
    #[command(subcommand)]
    pub command: Commands,

    /// Registry username
    #[arg(
        short = 'u',
        long,
        global = true,
        env = "BINCAST_USERNAME",
        help = "Registry username"
    )]
    pub username: Option<String>,

    /// Registry password
    #[arg(
        short = 'p',
        long,
        global = true,
        env = "BINCAST_PASSWORD",
        hide_env_values = true,
        help = "Registry password"
    )]
    pub password: Option<String>,

    /// Use plain HTTP instead of HTTPS
    #[arg(long, global = true, help = "Talk plain HTTP to the registry")]
    pub insecure: bool,

    /// Info level logs and cache paths in listings
    #[arg(short = 'v', long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Registry for references that do not name one
    #[arg(
        short = 'r',
        long,
        global = true,
        help = "Registry for references without one (e.g. localhost:5000)"
    )]
    pub registry: Option<String>,

    /// Cache root, defaults to the user cache directory
    #[arg(
        long,
        global = true,
        env = "BINCAST_CACHE_DIR",
        help = "Directory for cached binaries"
    )]
    pub cache_dir: Option<PathBuf>,

    /// Log level
    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// JSON output and logs
    #[arg(long, global = true, help = "Output results and logs as JSON")]
    pub json: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Push one binary per platform under a tag
    #[command(about = "Push binaries as a multi-architecture artifact")]
    #[command(
        after_help = "Example:\n  bincast push registry.example.com/app:v1.0.0 \\\n    -b linux/amd64=./bin/app-linux-amd64 \\\n    -b darwin/arm64=./bin/app-darwin-arm64"
    )]
    Push {
        /// Artifact reference
        #[arg(help = "Artifact reference (repository:tag)")]
        reference: String,
        /// `os/arch=path` bindings
        #[arg(
            short = 'b',
            long = "bin",
            required = true,
            value_name = "OS/ARCH=PATH",
            help = "Binary for a platform, repeatable"
        )]
        bins: Vec<String>,
    },
    /// Download the binary for a platform
    #[command(about = "Pull the binary for the current or a given platform")]
    Pull {
        /// Artifact reference
        #[arg(help = "Artifact reference (repository:tag)")]
        reference: String,
        /// Output path
        #[arg(help = "Where to write the binary", default_value = "binary")]
        output: PathBuf,
        /// Platform override
        #[arg(long, help = "Platform to pull (e.g. linux/amd64), defaults to this host")]
        platform: Option<Platform>,
    },
    /// Run a binary, from the cache when possible
    #[command(about = "Run a binary from the registry, downloading it if not cached")]
    Run {
        /// Artifact reference
        #[arg(help = "Artifact reference (repository:tag)")]
        reference: String,
        /// Platform override
        #[arg(long, help = "Platform to run (e.g. linux/amd64), defaults to this host")]
        platform: Option<Platform>,
        /// Skip the cache lookup
        #[arg(long, help = "Download again even if the binary is cached")]
        no_cache: bool,
        /// Arguments for the binary
        #[arg(last = true, help = "Arguments passed to the binary")]
        args: Vec<String>,
    },
    /// List the platforms of an artifact
    #[command(about = "List the platforms available for an artifact")]
    List {
        /// Artifact reference
        #[arg(help = "Artifact reference (repository:tag)")]
        reference: String,
    },
    /// List locally cached binaries
    #[command(about = "List locally cached binaries")]
    Cached,
}

impl Cli {
    /// Library options for this invocation.
    #[must_use]
    pub fn options(&self) -> Options {
        Options {
            registry: self.registry.clone(),
            username: self.username.clone(),
            password: self.password.clone().map(SecretString::from),
            insecure: self.insecure,
            cache_dir: self.cache_dir.clone(),
            docker_config: None,
        }
    }
}

/// Parse command line arguments into a CLI structure.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
