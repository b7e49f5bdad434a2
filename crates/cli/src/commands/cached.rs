//! `bincast cached`: list the binaries in the local cache.

use bincast_core::{CacheEntry, Options};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

use super::to_json;
use crate::errors::CliError;

#[derive(Debug, Serialize)]
struct CachedOutput {
    reference: String,
    platform: String,
    digest: String,
    size: u64,
    cached_at: DateTime<Utc>,
    path: String,
}

impl From<&CacheEntry> for CachedOutput {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            reference: entry.reference(),
            platform: entry.platform().to_string(),
            digest: entry.metadata.digest.clone(),
            size: entry.binary_size,
            cached_at: entry.metadata.cached_at,
            path: entry.binary_path.display().to_string(),
        }
    }
}

/// Execute the cached command.
///
/// Paths are only shown with `--verbose`.
///
/// # Errors
///
/// Returns an error if the cache directory cannot be read.
pub fn execute_cached(options: &Options, verbose: bool, json: bool) -> Result<String, CliError> {
    let entries = bincast_core::cached(&options.cache())?;

    if json {
        return to_json(entries.iter().map(CachedOutput::from).collect::<Vec<_>>());
    }
    Ok(format_entries(&entries, verbose, Utc::now()))
}

fn format_entries(entries: &[CacheEntry], verbose: bool, now: DateTime<Utc>) -> String {
    if entries.is_empty() {
        return "No cached binaries found".to_string();
    }

    let mut output = String::new();
    let _ = writeln!(output, "Cached binaries ({}):\n", entries.len());
    for entry in entries {
        let _ = writeln!(output, "  {}", entry.reference());
        let _ = writeln!(output, "    Platform: {}", entry.platform());
        let _ = writeln!(output, "    Digest:   {}", entry.metadata.digest);
        let _ = writeln!(output, "    Size:     {}", format_size(entry.binary_size));
        let _ = writeln!(
            output,
            "    Cached:   {}",
            format_age(entry.metadata.cached_at, now)
        );
        if verbose {
            let _ = writeln!(output, "    Path:     {}", entry.binary_path.display());
        }
        output.push('\n');
    }
    output.trim_end().to_string()
}

/// Human-readable size in 1024 steps: `512 B`, `1.5 KB`, `3.0 MB`.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let unit = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {unit}B", bytes as f64 / div as f64)
}

/// How long ago `then` was, falling back to the date after a week.
fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);

    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {unit} ago")
        } else {
            format!("{n} {unit}s ago")
        }
    };

    if elapsed.num_minutes() < 1 {
        "just now".to_string()
    } else if elapsed.num_hours() < 1 {
        plural(elapsed.num_minutes(), "minute")
    } else if elapsed.num_days() < 1 {
        plural(elapsed.num_hours(), "hour")
    } else if elapsed.num_days() < 7 {
        plural(elapsed.num_days(), "day")
    } else {
        then.format("%Y-%m-%d").to_string()
    }
}
