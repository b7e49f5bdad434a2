//! `bincast push`: publish one binary per platform under a tag.

use bincast_core::{Descriptor, Error, Options, Platform, PushProgress, PushReport};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::{self, Write};
use tokio_util::sync::CancellationToken;

use super::{parse_reference, to_json};
use crate::errors::CliError;

/// Prints one line per platform as the push goes.
///
/// Output goes straight to stdout so the user sees each platform finish
/// while the next one uploads.
struct ConsoleProgress;

impl ConsoleProgress {
    fn emit(text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl PushProgress for ConsoleProgress {
    fn platform_started(&self, index: usize, total: usize, platform: &Platform) {
        Self::emit(&format!("[{index}/{total}] Pushing {platform}... "));
    }

    fn platform_finished(&self, _index: usize, _total: usize, _platform: &Platform) {
        Self::emit("✓\n");
    }

    fn platform_failed(&self, _index: usize, _total: usize, _platform: &Platform, _error: &Error) {
        Self::emit("FAILED\n");
    }

    fn index_pushed(&self, _descriptor: &Descriptor) {
        Self::emit("Creating manifest index... ✓\n");
    }
}

#[derive(Debug, Serialize)]
struct PushOutput {
    reference: String,
    digest: String,
    platforms: Vec<PushedPlatform>,
}

#[derive(Debug, Serialize)]
struct PushedPlatform {
    platform: String,
    digest: String,
    size: u64,
}

/// Execute the push command.
///
/// Bindings are validated before anything is sent, so a bad `--bin` never
/// leaves partial content behind.
///
/// # Errors
///
/// Returns an error for malformed bindings or a failed upload.
pub async fn execute_push(
    options: &Options,
    reference: &str,
    bins: &[String],
    json: bool,
    cancel: &CancellationToken,
) -> Result<String, CliError> {
    let binaries = bincast_core::parse_bindings(bins)?;
    let reference = parse_reference(options, reference)?;
    let client = options.connect(&reference);

    let report = if json {
        bincast_core::push(&client, &reference, &binaries, &(), cancel).await?
    } else {
        bincast_core::push(&client, &reference, &binaries, &ConsoleProgress, cancel).await?
    };

    let whole = reference.whole();
    if json {
        return to_json(push_output(whole, &report));
    }
    Ok(format_summary(&whole, &report))
}

fn push_output(reference: String, report: &PushReport) -> PushOutput {
    PushOutput {
        reference,
        digest: report.index.digest.clone(),
        platforms: report
            .manifests
            .iter()
            .map(|m| PushedPlatform {
                platform: m
                    .platform
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                digest: m.digest.clone(),
                size: m.size,
            })
            .collect(),
    }
}

fn format_summary(reference: &str, report: &PushReport) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "\nSuccessfully pushed {} binaries to {reference}",
        report.len()
    );
    let _ = write!(output, "Manifest digest: {}", report.index.digest);
    output
}
