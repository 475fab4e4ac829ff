//! Typed argument lists for external archivers, executed without a shell.

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Result, ZipdirError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a tool may run, and how long it gets to exit after SIGTERM.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub timeout: Option<Duration>,
    pub grace: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self { timeout: None, grace: Duration::from_secs(5) }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub command: String,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl ToolCommand {
    /// `prefix` is the program followed by any leading arguments.
    pub fn new(prefix: &[String]) -> Result<Self> {
        let (program, leading) = prefix
            .split_first()
            .ok_or_else(|| ZipdirError::Config("tool command must name a program".into()))?;
        if program.trim().is_empty() {
            return Err(ZipdirError::Config("tool command must name a program".into()));
        }
        let mut cmd = Self { program: program.into(), args: Vec::new() };
        for a in leading {
            cmd.push(a)?;
        }
        Ok(cmd)
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Result<Self> {
        self.push(arg)?;
        Ok(self)
    }

    fn push(&mut self, arg: impl AsRef<OsStr>) -> Result<()> {
        let arg = arg.as_ref();
        if arg.is_empty() || arg.to_string_lossy().contains('\0') {
            return Err(ZipdirError::Precondition(format!(
                "invalid argument {:?} for {}",
                arg,
                self.program.to_string_lossy()
            )));
        }
        self.args.push(arg.to_os_string());
        Ok(())
    }

    /// Human-readable form for logs and errors.
    pub fn render(&self) -> String {
        let mut out = self.program.to_string_lossy().to_string();
        for a in &self.args {
            let a = a.to_string_lossy();
            out.push(' ');
            if a.contains(char::is_whitespace) {
                out.push_str(&format!("{:?}", a));
            } else {
                out.push_str(&a);
            }
        }
        out
    }

    /// Run to completion. Non-zero exits become `ExternalTool` errors.
    pub fn run(&self, limits: &RunLimits) -> Result<ExecutionResult> {
        let rendered = self.render();
        debug!(command = %rendered, "running external tool");
        let started = Instant::now();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ZipdirError::ExternalTool {
                command: rendered.clone(),
                code: None,
                stdout: String::new(),
                stderr: format!("failed to launch: {}", e),
            })?;

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = match limits.timeout {
            None => child.wait()?,
            Some(limit) => match wait_until(&mut child, started + limit)? {
                Some(status) => status,
                None => {
                    warn!(command = %rendered, secs = limit.as_secs(), "tool timed out; terminating");
                    terminate(&mut child, limits.grace)?;
                    // reader threads may be held open by grandchildren; leave them
                    return Err(ZipdirError::Timeout { command: rendered, secs: limit.as_secs() });
                }
            },
        };

        let result = ExecutionResult {
            command: rendered,
            code: status.code(),
            stdout: join_reader(stdout),
            stderr: join_reader(stderr),
            elapsed: started.elapsed(),
        };
        debug!(command = %result.command, code = ?result.code, elapsed_ms = result.elapsed.as_millis() as u64, "tool finished");

        if status.success() {
            Ok(result)
        } else {
            Err(ZipdirError::ExternalTool {
                command: result.command,
                code: result.code,
                stdout: result.stdout,
                stderr: result.stderr,
            })
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).to_string())
        .unwrap_or_default()
}

fn wait_until(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM, then SIGKILL once the grace period runs out.
fn terminate(child: &mut Child, grace: Duration) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).is_ok()
            && wait_until(child, Instant::now() + grace)?.is_some()
        {
            return Ok(());
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    match child.kill() {
        Ok(()) => {}
        // already exited
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
        Err(e) => return Err(e.into()),
    }
    child.wait()?;
    Ok(())
}
