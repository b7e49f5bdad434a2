//! bincast CLI Application

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use bincast::cli::{self, Cli};
use bincast::shutdown::{EXIT_SIGINT, install_cancel_handler};
use bincast::tracing::{TracingConfig, init_tracing};
use bincast::{EXIT_OK, exit_code_for, render_error};

fn main() {
    // NOTE: Using eprintln! in panic hook is intentional - tracing infrastructure
    // may be corrupted during a panic, so we use the most reliable output method.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = rt.block_on(run(cli));
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> i32 {
    let config = TracingConfig::from_flags(cli.level, cli.verbose, cli.json);
    if let Err(e) = init_tracing(&config) {
        eprintln!("Warning: {e}");
    }

    let cancel = install_cancel_handler();

    // Registry calls already race the token; this arm covers work between them
    tokio::select! {
        biased;

        () = cancel.cancelled() => EXIT_SIGINT,
        result = bincast::commands::execute(&cli, &cancel) => match result {
            Ok(output) => {
                if !output.is_empty() {
                    println!("{output}");
                }
                EXIT_OK
            }
            Err(err) => {
                render_error(&err, cli.json);
                exit_code_for(&err)
            }
        },
    }
}
