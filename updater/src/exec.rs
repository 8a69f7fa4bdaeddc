//! Smoke testing of freshly staged binaries.
//!
//! A staged artifact built for the running platform is executed once with
//! `--version` before it is published. A binary that cannot start or exits
//! non-zero is corrupt or built for the wrong architecture, even though its
//! hashes matched.

use crate::error::{Result, UpdateError};
use camino::Utf8Path;
use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Argument every artifact must accept.
pub const VERSION_ARG: &str = "--version";

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Run `program` with `args`, returning its captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O error encountered while spawning or waiting, and
    /// [`io::ErrorKind::TimedOut`] when `timeout` elapses first.
    fn run(&self, program: &Utf8Path, args: &[&str], timeout: Duration) -> io::Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(
        &self,
        program: &Utf8Path,
        args: &[&str],
        timeout: Duration,
    ) -> io::Result<Output> {
        let mut child = Command::new(program.as_std_path())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes while waiting so a chatty child cannot block on a
        // full pipe buffer.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        match child.wait_timeout(timeout)? {
            Some(status) => Ok(Output {
                status,
                stdout: collect(stdout)?,
                stderr: collect(stderr)?,
            }),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out after {timeout:?}"),
                ))
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn collect(reader: Option<JoinHandle<io::Result<Vec<u8>>>>) -> io::Result<Vec<u8>> {
    reader.map_or_else(
        || Ok(Vec::new()),
        |handle| {
            handle
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("output reader panicked")))
        },
    )
}

/// Run `binary --version` and require a zero exit.
///
/// # Errors
///
/// Returns [`UpdateError::SmokeTest`] with the exit status and combined
/// output, or with the spawn error.
pub fn smoke_test(
    executor: &dyn CommandExecutor,
    binary: &Utf8Path,
    timeout: Duration,
) -> Result<()> {
    let output = executor
        .run(binary, &[VERSION_ARG], timeout)
        .map_err(|e| UpdateError::SmokeTest {
            path: binary.to_owned(),
            reason: e.to_string(),
        })?;
    if output.status.success() {
        return Ok(());
    }
    Err(UpdateError::SmokeTest {
        path: binary.to_owned(),
        reason: format!("{}: {}", output.status, combined_output(&output)),
    })
}

fn combined_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined.trim().to_owned()
}
