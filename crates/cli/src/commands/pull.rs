//! `bincast pull`: download the binary for one platform.

use bincast_core::{BinaryInfo, Options, Platform, PullOptions};
use serde::Serialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::{parse_reference, to_json};
use crate::errors::CliError;

#[derive(Debug, Serialize)]
struct PullOutput {
    path: String,
    platform: String,
    digest: String,
    size: u64,
}

impl From<&BinaryInfo> for PullOutput {
    fn from(info: &BinaryInfo) -> Self {
        Self {
            path: info.path.display().to_string(),
            platform: info.platform.to_string(),
            digest: info.digest.clone(),
            size: info.size,
        }
    }
}

/// Execute the pull command.
///
/// # Errors
///
/// Returns an error if the platform is missing from the artifact, the
/// download fails or the output cannot be written.
pub async fn execute_pull(
    options: &Options,
    reference: &str,
    output: &Path,
    platform: Option<Platform>,
    json: bool,
    cancel: &CancellationToken,
) -> Result<String, CliError> {
    let reference = parse_reference(options, reference)?;
    let client = options.connect(&reference);

    let pull_options = PullOptions {
        platform,
        output: Some(output.to_path_buf()),
        use_cache: true,
        cache: options.cache(),
    };
    let info = bincast_core::pull(&client, &reference, &pull_options, cancel).await?;

    if json {
        return to_json(PullOutput::from(&info));
    }
    Ok(format!("Successfully pulled to {}", info.path.display()))
}
