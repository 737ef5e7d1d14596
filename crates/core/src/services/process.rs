use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::config::ToolCommand;

/// Poll interval while waiting on a child with a deadline.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// A fully specified external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), timeout: None }
    }

    /// Start from a configured command (program + leading args).
    pub fn from_command(command: &ToolCommand) -> Self {
        Self { program: command.program.clone(), args: command.args.clone(), timeout: None }
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

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished tool. A non-zero exit is *not* an error at this level.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Permission denied running {program}")]
    PermissionDenied { program: String },
    #[error("{program} exited with {code:?}")]
    NonZeroExit { program: String, code: Option<i32>, stdout: String, stderr: String },
    #[error("{program} exceeded its timeout of {timeout:?}")]
    TimeoutExceeded { program: String, timeout: Duration },
    #[error("I/O error capturing tool output: {0}")]
    Io(#[from] io::Error),
}

impl ToolError {
    /// Turn an unsuccessful output into a `NonZeroExit`, keeping captured streams.
    pub fn non_zero(program: &str, output: ToolOutput) -> Self {
        ToolError::NonZeroExit {
            program: program.to_string(),
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Seam through which every external process is launched.
///
/// Invocations only block the calling worker; implementations must be shareable
/// across the extraction pool.
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError>;
}

/// Runs real processes, capturing stdout/stderr into temporary files.
///
/// File capture avoids pipe-buffer stalls on chatty tools; the files are
/// removed when this call returns, on every path.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    temp_dir: Option<PathBuf>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place capture files under `dir` instead of the system temp directory.
    pub fn with_temp_dir(dir: impl Into<PathBuf>) -> Self {
        Self { temp_dir: Some(dir.into()) }
    }

    fn capture_file(&self) -> io::Result<NamedTempFile> {
        match &self.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                NamedTempFile::new_in(dir)
            }
            None => NamedTempFile::new(),
        }
    }
}

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        tracing::debug!(command = %invocation, "running tool");
        let out_file = self.capture_file()?;
        let err_file = self.capture_file()?;

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out_file.as_file().try_clone()?))
            .stderr(Stdio::from(err_file.as_file().try_clone()?));
        // Lead a fresh process group so a timeout reaches build helpers and sudo children.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::PermissionDenied => {
                    ToolError::PermissionDenied { program: invocation.program.clone() }
                }
                _ => ToolError::Spawn { program: invocation.program.clone(), source: e },
            })?;

        let status: ExitStatus = match invocation.timeout {
            None => child.wait()?,
            Some(timeout) => {
                let started = Instant::now();
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if started.elapsed() >= timeout {
                        kill_tree(&mut child);
                        tracing::warn!(command = %invocation, ?timeout, "tool timed out");
                        return Err(ToolError::TimeoutExceeded {
                            program: invocation.program.clone(),
                            timeout,
                        });
                    }
                    thread::sleep(WAIT_POLL);
                }
            }
        };

        let stdout = String::from_utf8_lossy(&std::fs::read(out_file.path())?).to_string();
        let stderr = String::from_utf8_lossy(&std::fs::read(err_file.path())?).to_string();
        let output = ToolOutput { code: status.code(), stdout, stderr };
        tracing::debug!(command = %invocation, code = ?output.code, "tool finished");
        Ok(output)
    }
}

/// Kill `child` and everything it spawned, then reap it.
///
/// Kill may race with a natural exit; either way the child is reaped.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg only sends a signal; the group id is our own child's pid.
            if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
                tracing::debug!(
                    pgid,
                    error = %io::Error::last_os_error(),
                    "could not signal process group"
                );
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}
