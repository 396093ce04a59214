//! Invocation of the firewall listing tool
//!
//! chainwatch never talks to the kernel itself. It runs `iptables -L -n -v -x`
//! -- numeric addresses, no DNS lookups, verbose counters, exact rather than
//! abbreviated numbers -- and hands its standard output to the parser. Only the
//! exit status and the captured standard output matter. No timeout is applied:
//! a hung tool hangs the sample.

use std::{
    future::Future,
    io,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    string::FromUtf8Error,
};

use tokio::process::Command;
use tracing::trace;

/// Default listing tool, looked up on `PATH`.
pub const DEFAULT_COMMAND: &str = "iptables";

#[derive(thiserror::Error, Debug)]
/// Errors produced when invoking the listing tool
pub enum Error {
    /// The tool could not be started
    #[error("unable to spawn {command}: {source}")]
    Spawn {
        /// Tool that failed to start
        command: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },
    /// The tool ran and reported failure
    #[error("{command} exited with {status}: {stderr}")]
    Exit {
        /// Tool that failed
        command: String,
        /// Its exit status
        status: ExitStatus,
        /// What it wrote to standard error, trimmed
        stderr: String,
    },
    /// The tool output is not text
    #[error("{command} produced output that is not UTF-8: {source}")]
    Utf8 {
        /// Tool that produced the output
        command: String,
        /// Underlying conversion error
        #[source]
        source: FromUtf8Error,
    },
}

/// A producer of table listings.
pub trait Source {
    /// Capture the current listing as text.
    fn capture(&mut self) -> impl Future<Output = Result<String, Error>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Lists a table by running `iptables`, or a compatible tool, as a
/// sub-process.
pub struct Iptables {
    command: PathBuf,
    table: Option<String>,
}

impl Iptables {
    /// Create a new [`Iptables`]
    ///
    /// An empty `table` is the same as no table: the tool's default, `filter`
    /// for iptables, is listed.
    #[must_use]
    pub fn new(command: PathBuf, table: Option<String>) -> Self {
        let table = table.filter(|t| !t.is_empty());
        Self { command, table }
    }

    /// Arguments passed to the tool.
    #[must_use]
    pub fn arguments(&self) -> Vec<&str> {
        let mut args = Vec::with_capacity(6);
        if let Some(table) = &self.table {
            args.extend(["-t", table.as_str()]);
        }
        args.extend(["-L", "-n", "-v", "-x"]);
        args
    }

    fn name(&self) -> String {
        self.command.display().to_string()
    }
}

impl Default for Iptables {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_COMMAND), None)
    }
}

impl Source for Iptables {
    async fn capture(&mut self) -> Result<String, Error> {
        let arguments = self.arguments();
        trace!(command = %self.command.display(), ?arguments, "running listing tool");

        let output = Command::new(&self.command)
            .args(&arguments)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| Error::Spawn {
                command: self.name(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Exit {
                command: self.name(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|source| Error::Utf8 {
            command: self.name(),
            source,
        })
    }
}
