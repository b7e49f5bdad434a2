//! `bincast run`: execute a binary straight from the registry.

use bincast_core::{ExecMode, Options, Platform, RunOptions};
use tokio_util::sync::CancellationToken;

use super::parse_reference;
use crate::errors::CliError;

/// Execute the run command.
///
/// On unix the binary replaces this process, so a successful return only
/// happens where that is not possible. A non-zero exit comes back as
/// [`CliError::Exit`] carrying the binary's code.
///
/// # Errors
///
/// Returns an error if the binary cannot be fetched or started, or exits
/// unsuccessfully.
pub async fn execute_run(
    options: &Options,
    reference: &str,
    platform: Option<Platform>,
    no_cache: bool,
    args: &[String],
    cancel: &CancellationToken,
) -> Result<String, CliError> {
    let reference = parse_reference(options, reference)?;
    let client = options.connect(&reference);

    let run_options = RunOptions {
        platform,
        no_cache,
        mode: ExecMode::Replace,
        cache: options.cache(),
    };
    bincast_core::run(&client, &reference, args, &run_options, cancel).await?;
    Ok(String::new())
}
