//! Platform detection and parsing.
//!
//! Platforms use the registry vocabulary (`darwin`, `amd64`, `arm64`, ...)
//! rather than Rust's target names, so the host platform is translated once
//! here and everything else compares plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// An operating system / architecture pair.
///
/// Both fields are free-form; two platforms are equal only when both
/// strings match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system (darwin, linux, windows, ...).
    pub os: String,
    /// Architecture (amd64, arm64, ...).
    #[serde(rename = "architecture")]
    pub arch: String,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Parse an `os/arch` string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((os, arch)) if !os.is_empty() && !arch.is_empty() && !arch.contains('/') => {
                Ok(Self::new(os, arch))
            }
            _ => Err(Error::InvalidPlatform(s.to_string())),
        }
    }

    /// File name used for this platform's binary inside a cache slot.
    #[must_use]
    pub fn slot_name(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Get the platform of the running process.
#[must_use]
pub fn current_platform() -> Platform {
    Platform::new(
        registry_os(std::env::consts::OS),
        registry_arch(std::env::consts::ARCH),
    )
}

fn registry_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn registry_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => ppc64(cfg!(target_endian = "little")),
        "wasm32" => "wasm",
        other => other,
    }
}

const fn ppc64(little_endian: bool) -> &'static str {
    if little_endian { "ppc64le" } else { "ppc64" }
}
