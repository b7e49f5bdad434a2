//! Running a resolved binary.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

use crate::{Error, Result};

/// How to hand control to the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// Replace the current process image. Elsewhere than unix, spawn the
    /// child and exit with its code.
    #[default]
    Replace,
    /// Run as a child with inherited stdio and wait for it.
    Spawn,
}

/// Execute `path` with `args`.
///
/// `Ok` means the binary exited with code 0; any other exit is
/// [`Error::NonZeroExit`] carrying the code.
pub async fn execute<I, S>(path: &Path, args: I, mode: ExecMode) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if !path.is_file() {
        return Err(Error::BinaryNotFound(path.to_path_buf()));
    }
    let args: Vec<_> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    info!(?path, args = args.len(), ?mode, "Executing binary");

    match mode {
        ExecMode::Spawn => spawn(path, &args).await,
        ExecMode::Replace => replace(path, &args).await,
    }
}

async fn spawn(path: &Path, args: &[std::ffi::OsString]) -> Result<()> {
    let status = Command::new(path)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| launch_error(path, e))?;

    let code = exit_code(status);
    debug!(code, "Binary exited");
    if code == 0 {
        Ok(())
    } else {
        Err(Error::NonZeroExit { code })
    }
}

#[cfg(unix)]
#[allow(clippy::unused_async)]
async fn replace(path: &Path, args: &[std::ffi::OsString]) -> Result<()> {
    use std::os::unix::process::CommandExt;

    // Only returns when the exec itself failed.
    let err = std::process::Command::new(path).args(args).exec();
    Err(launch_error(path, err))
}

#[cfg(not(unix))]
async fn replace(path: &Path, args: &[std::ffi::OsString]) -> Result<()> {
    let code = match spawn(path, args).await {
        Ok(()) => 0,
        Err(Error::NonZeroExit { code }) => code,
        Err(e) => return Err(e),
    };
    std::process::exit(code)
}

fn launch_error(path: &Path, err: std::io::Error) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::BinaryNotFound(path.to_path_buf())
    } else {
        Error::Launch {
            path: path.to_path_buf(),
            source: err,
        }
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
