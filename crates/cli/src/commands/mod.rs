//! Command implementations for the bincast CLI
//!
//! Each command returns the text to print on success. In JSON mode that text
//! is an [`OkEnvelope`](crate::errors::OkEnvelope) around the command's data.

pub mod cached;
pub mod list;
pub mod pull;
pub mod push;
pub mod run;

use bincast_core::Reference;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Commands};
use crate::errors::{CliError, OkEnvelope};

/// Run the command selected on the command line.
///
/// # Errors
///
/// Returns the command's failure mapped to a [`CliError`].
pub async fn execute(cli: &Cli, cancel: &CancellationToken) -> Result<String, CliError> {
    let options = cli.options();

    match &cli.command {
        Commands::Push { reference, bins } => {
            push::execute_push(&options, reference, bins, cli.json, cancel).await
        }
        Commands::Pull {
            reference,
            output,
            platform,
        } => {
            pull::execute_pull(
                &options,
                reference,
                output,
                platform.clone(),
                cli.json,
                cancel,
            )
            .await
        }
        Commands::Run {
            reference,
            platform,
            no_cache,
            args,
        } => {
            run::execute_run(&options, reference, platform.clone(), *no_cache, args, cancel).await
        }
        Commands::List { reference } => {
            list::execute_list(&options, reference, cli.json, cancel).await
        }
        Commands::Cached => cached::execute_cached(&options, cli.verbose, cli.json),
    }
}

fn parse_reference(
    options: &bincast_core::Options,
    reference: &str,
) -> Result<Reference, CliError> {
    Ok(options.parse_reference(reference)?)
}

fn to_json<T: Serialize>(data: T) -> Result<String, CliError> {
    serde_json::to_string_pretty(&OkEnvelope::new(data))
        .map_err(|e| CliError::other(format!("Failed to serialize output: {e}")))
}
