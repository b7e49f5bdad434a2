//! `bincast list`: show the platforms an artifact offers.

use bincast_core::{LayerEntry, Listing, Options, PlatformEntry};
use serde::Serialize;
use std::fmt::Write;
use tokio_util::sync::CancellationToken;

use super::{parse_reference, to_json};
use crate::errors::CliError;

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ListOutput {
    Index {
        platforms: Vec<PlatformOutput>,
    },
    Manifest {
        platform: Option<String>,
        layers: Vec<LayerOutput>,
    },
    Unknown {
        media_type: String,
    },
}

#[derive(Debug, Serialize)]
struct PlatformOutput {
    platform: String,
    digest: String,
    size: u64,
}

#[derive(Debug, Serialize)]
struct LayerOutput {
    digest: String,
    size: u64,
    media_type: String,
}

impl From<&Listing> for ListOutput {
    fn from(listing: &Listing) -> Self {
        match listing {
            Listing::Index(entries) => Self::Index {
                platforms: entries
                    .iter()
                    .map(|e| PlatformOutput {
                        platform: e.platform.to_string(),
                        digest: e.digest.clone(),
                        size: e.size,
                    })
                    .collect(),
            },
            Listing::Manifest { platform, layers } => Self::Manifest {
                platform: platform.as_ref().map(ToString::to_string),
                layers: layers
                    .iter()
                    .map(|l| LayerOutput {
                        digest: l.digest.clone(),
                        size: l.size,
                        media_type: l.media_type.clone(),
                    })
                    .collect(),
            },
            Listing::Unknown(media_type) => Self::Unknown {
                media_type: media_type.clone(),
            },
        }
    }
}

/// Execute the list command.
///
/// # Errors
///
/// Returns an error if the reference cannot be resolved or its content
/// cannot be fetched.
pub async fn execute_list(
    options: &Options,
    reference: &str,
    json: bool,
    cancel: &CancellationToken,
) -> Result<String, CliError> {
    let reference = parse_reference(options, reference)?;
    let client = options.connect(&reference);
    let listing = bincast_core::list(&client, &reference, cancel).await?;

    if json {
        return to_json(ListOutput::from(&listing));
    }
    Ok(format_listing(&listing))
}

fn format_listing(listing: &Listing) -> String {
    match listing {
        Listing::Index(entries) => format_index(entries),
        Listing::Manifest { platform, layers } => {
            let mut output = String::from("Single platform manifest:\n");
            if let Some(platform) = platform {
                let _ = writeln!(output, "  Platform: {platform}");
            }
            output.push_str(&format_layers(layers));
            output
        }
        Listing::Unknown(media_type) => format!("Unknown media type: {media_type}"),
    }
}

fn format_index(entries: &[PlatformEntry]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Available platforms ({}):", entries.len());
    for entry in entries {
        let _ = writeln!(
            output,
            "  {} (digest: {}, size: {} bytes)",
            entry.platform, entry.digest, entry.size
        );
    }
    output.trim_end().to_string()
}

fn format_layers(layers: &[LayerEntry]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "  Layers: {}", layers.len());
    for (i, layer) in layers.iter().enumerate() {
        let _ = writeln!(
            output,
            "    [{i}] {} (size: {} bytes)",
            layer.digest, layer.size
        );
    }
    output.trim_end().to_string()
}
