//! Ctrl-C handling for the bincast CLI

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Exit code for SIGINT (128 + signal number 2)
pub const EXIT_SIGINT: i32 = 130;

/// Install a Ctrl-C handler that cancels the returned token.
///
/// Registry calls race against the token, so an interrupted command stops at
/// the next network round trip instead of being killed mid-write.
#[must_use]
pub fn install_cancel_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, cancelling");
                cancel.cancel();
            }
            Err(e) => debug!(error = %e, "Ctrl-C handler unavailable"),
        }
    });

    token
}
