//! Process Controller for the watched command
//!
//! The child is spawned as the leader of its own process group so that a
//! single signal reaches the whole tree (`npm` -> `sh` -> `tsc`/`mocha`).
//!
//! ## Termination
//!
//! `terminate()` sends SIGINT to the group and waits for the leader. If the
//! leader is still alive after the grace period the group gets SIGKILL.
//! Dropping an un-terminated `WatchProcess` sends SIGKILL to the group, so a
//! panicking test never leaves a watcher behind.

use crate::error::{HarnessError, Result};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Default time between SIGINT and SIGKILL
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// What to launch and where
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub grace: Duration,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
            grace: DEFAULT_GRACE,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Human-readable command line for logs and errors
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Run a one-shot command to completion (e.g. `npm install`) before a watcher starts
pub async fn run_to_completion(spec: &ProcessSpec) -> Result<()> {
    let command = spec.display();
    info!(cwd = %spec.cwd.display(), "running `{}`", command);
    let status = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|source| HarnessError::Spawn {
            command: command.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(HarnessError::Setup {
            command,
            status: status.to_string(),
        })
    }
}

/// A running watch-mode process
pub struct WatchProcess {
    child: Child,
    pid: u32,
    grace: Duration,
    exit: Option<ExitStatus>,
}

impl WatchProcess {
    /// Spawn `spec` without a shell, stdout piped, in a fresh process group
    pub fn spawn(spec: &ProcessSpec) -> Result<Self> {
        let command = spec.display();
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .process_group(0)
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                command: command.clone(),
                source,
            })?;

        let pid = child.id().ok_or_else(|| HarnessError::Spawn {
            command: command.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "child exited before pid was read"),
        })?;

        info!(pid, cwd = %spec.cwd.display(), "spawned `{}`", command);

        Ok(Self {
            child,
            pid,
            grace: spec.grace,
            exit: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Hand over the stdout pipe (only once)
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// True while the group leader has not exited
    pub fn is_running(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Exit status, if `terminate` already completed
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Interrupt the process group and wait for the leader to exit.
    ///
    /// Escalates to SIGKILL after the grace period. Repeated calls return the
    /// status recorded by the first one.
    pub async fn terminate(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }

        let early = self.child.try_wait().map_err(|e| self.wait_error(e))?;
        let status = match early {
            Some(status) => {
                debug!(pid = self.pid, "process already exited: {}", status);
                status
            }
            None => {
                self.signal_group(Signal::SIGINT)?;
                match tokio::time::timeout(self.grace, self.child.wait()).await {
                    Ok(res) => res.map_err(|e| self.wait_error(e))?,
                    Err(_) => {
                        warn!(
                            pid = self.pid,
                            "no exit {}ms after SIGINT, sending SIGKILL",
                            self.grace.as_millis()
                        );
                        self.signal_group(Signal::SIGKILL)?;
                        self.child.wait().await.map_err(|e| self.wait_error(e))?
                    }
                }
            }
        };

        // Grandchildren may outlive the leader; sweep whatever is left of the group
        let _ = killpg(self.pgid(), Signal::SIGKILL);

        info!(pid = self.pid, "process exited: {}", status);
        self.exit = Some(status);
        Ok(status)
    }

    fn pgid(&self) -> Pid {
        Pid::from_raw(self.pid as i32)
    }

    fn signal_group(&self, signal: Signal) -> Result<()> {
        debug!(pid = self.pid, "sending {} to process group", signal.as_str());
        match killpg(self.pgid(), signal) {
            // Group already gone: nothing left to stop
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(HarnessError::Terminate {
                pid: self.pid,
                reason: format!("{}: {}", signal.as_str(), e),
            }),
        }
    }

    fn wait_error(&self, e: std::io::Error) -> HarnessError {
        HarnessError::Terminate {
            pid: self.pid,
            reason: format!("wait failed: {}", e),
        }
    }
}

impl Drop for WatchProcess {
    fn drop(&mut self) {
        if self.exit.is_none() {
            let _ = killpg(self.pgid(), Signal::SIGKILL);
            let _ = self.child.start_kill();
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
