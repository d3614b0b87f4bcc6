//! Spawning the user command.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::{CommandResult, NOT_EXECUTABLE_EXIT_CODE, NOT_FOUND_EXIT_CODE, SIGNALED_EXIT_CODE};
use crate::context::WorkingContext;
use crate::error::RunError;
use crate::repo::RevisionRef;

/// The command to run for every revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program followed by its arguments
    pub args: Vec<String>,
    /// Run the joined arguments through `sh -c`
    pub shell: bool,
}

impl CommandSpec {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            shell: false,
        }
    }

    /// Run through the shell instead of executing the program directly.
    pub fn with_shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    fn build(&self, dir: &Path) -> Command {
        let mut cmd = if self.shell {
            let mut sh = Command::new("sh");
            sh.arg("-c").arg(self.args.join(" "));
            sh
        } else {
            let mut direct = Command::new(self.args.first().map(String::as_str).unwrap_or_default());
            direct.args(self.args.iter().skip(1));
            direct
        };
        cmd.current_dir(dir);
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// Runs the command in working contexts.
///
/// The environment is inherited untouched; stdin is closed. Children are
/// killed if the run future is dropped. A command that times out is killed
/// and keeps whatever output it wrote before the deadline.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    spec: CommandSpec,
    timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec, timeout: None }
    }

    /// Kill the command after `timeout`. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Run in a working context. Never fails; problems land in the result.
    pub async fn run(&self, context: &WorkingContext) -> CommandResult {
        self.run_in(context.revision(), context.path()).await
    }

    /// Run in an arbitrary directory on behalf of `revision`.
    pub async fn run_in(&self, revision: &RevisionRef, dir: &Path) -> CommandResult {
        let start = Instant::now();

        if self.spec.args.is_empty() {
            return spawn_failed(revision, "empty command".to_string(), NOT_FOUND_EXIT_CODE, start);
        }

        let mut cmd = self.spec.build(dir);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                log::debug!("Failed to spawn {} for {}: {}", self.spec, revision.short(), e);
                return spawn_failed(revision, e.to_string(), spawn_exit_code(&e), start);
            }
        };

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let waited = {
            let collect = async {
                let (_, _, status) = tokio::try_join!(
                    drain(stdout_pipe, &mut stdout),
                    drain(stderr_pipe, &mut stderr),
                    child.wait()
                )?;
                Ok::<_, io::Error>(status)
            };
            match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, collect).await.map_err(|_| timeout),
                None => Ok(collect.await),
            }
        };

        match waited {
            Ok(Ok(status)) => {
                let (exit_code, error) = classify(status);
                CommandResult {
                    revision: revision.clone(),
                    exit_code,
                    stdout,
                    stderr,
                    error,
                    duration: start.elapsed(),
                }
            }
            Ok(Err(e)) => spawn_failed(revision, format!("failed waiting for command: {}", e), NOT_EXECUTABLE_EXIT_CODE, start),
            Err(timeout) => {
                log::warn!("{} timed out after {:?} on {}", self.spec, timeout, revision.short());
                if let Err(e) = child.kill().await {
                    log::debug!("Failed to kill timed out command for {}: {}", revision.short(), e);
                }
                CommandResult {
                    revision: revision.clone(),
                    exit_code: SIGNALED_EXIT_CODE,
                    stdout,
                    stderr,
                    error: Some(RunError::TimedOut(timeout)),
                    duration: start.elapsed(),
                }
            }
        }
    }
}

/// Read `pipe` to its end. Bytes already read stay in `buf` if the future is
/// dropped early.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, buf: &mut Vec<u8>) -> io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn spawn_failed(revision: &RevisionRef, message: String, exit_code: i32, start: Instant) -> CommandResult {
    CommandResult {
        revision: revision.clone(),
        exit_code,
        stdout: Vec::new(),
        stderr: Vec::new(),
        error: Some(RunError::SpawnFailed(message)),
        duration: start.elapsed(),
    }
}

fn spawn_exit_code(e: &io::Error) -> i32 {
    if e.kind() == io::ErrorKind::NotFound {
        NOT_FOUND_EXIT_CODE
    } else {
        NOT_EXECUTABLE_EXIT_CODE
    }
}

#[cfg(unix)]
fn classify(status: ExitStatus) -> (i32, Option<RunError>) {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => (code, None),
        (None, Some(signal)) => (SIGNALED_EXIT_CODE, Some(RunError::Signaled(signal))),
        (None, None) => (SIGNALED_EXIT_CODE, None),
    }
}

#[cfg(not(unix))]
fn classify(status: ExitStatus) -> (i32, Option<RunError>) {
    (status.code().unwrap_or(SIGNALED_EXIT_CODE), None)
}
