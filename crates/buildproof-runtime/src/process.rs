//! External process execution with merged output capture.
//!
//! Every external tool (`pack`, `docker`) is driven through an
//! [`Executor`]. The system implementation streams stdout and stderr into a
//! single line-ordered buffer so that failures can always surface what the
//! tool printed. No timeout is applied here; callers own timeout policy.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

use buildproof_common::error::{BuildproofError, Result};

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to run (name on `PATH` or absolute path).
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Extra environment variables layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Working directory, if different from the current one.
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    /// Creates an invocation with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the child's working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Renders the command line for logs and error messages.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push_str(&format!("{arg:?}"));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Runs external commands and returns their combined output.
///
/// Implementors must return `BuildproofError::Process` carrying the captured
/// output when the command exits unsuccessfully.
pub trait Executor: Send + Sync {
    /// Runs the invocation to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exits non-zero.
    fn execute(&self, invocation: &Invocation) -> Result<String>;
}

/// Executor backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<String> {
        let command_line = invocation.command_line();
        tracing::debug!(command = %command_line, "executing");

        let mut cmd = Command::new(&invocation.program);
        let _ = cmd
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.working_dir {
            let _ = cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| BuildproofError::Io {
            path: invocation.program.clone(),
            source: e,
        })?;

        let buffer = Arc::new(Mutex::new(String::new()));
        let mut streams: Vec<Box<dyn Read + Send>> = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            streams.push(Box::new(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            streams.push(Box::new(stderr));
        }
        let pumps: Vec<_> = streams
            .into_iter()
            .map(|stream| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || pump_lines(stream, &buffer))
            })
            .collect();

        let status = child.wait().map_err(|e| BuildproofError::Io {
            path: invocation.program.clone(),
            source: e,
        })?;
        for pump in pumps {
            let _ = pump.join();
        }

        let output = buffer.lock().map(|b| b.clone()).unwrap_or_default();
        if status.success() {
            tracing::debug!(command = %command_line, bytes = output.len(), "command succeeded");
            Ok(output)
        } else {
            let exit_code = status.code().unwrap_or(-1);
            tracing::warn!(command = %command_line, exit_code, "command failed");
            Err(BuildproofError::Process {
                command: command_line,
                exit_code,
                output,
            })
        }
    }
}

/// Copies a stream into the shared buffer one line at a time.
fn pump_lines(stream: Box<dyn Read + Send>, buffer: &Mutex<String>) {
    let mut reader = BufReader::new(stream);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw);
                tracing::trace!(line = %line.trim_end(), "output");
                if let Ok(mut out) = buffer.lock() {
                    out.push_str(&line);
                    if !line.ends_with('\n') {
                        out.push('\n');
                    }
                }
            }
        }
    }
}

/// Resolves a binary name to an absolute path via `PATH`.
///
/// # Errors
///
/// Returns `NotFound` if the binary is not installed.
pub fn locate(binary: &Path) -> Result<PathBuf> {
    which::which(binary).map_err(|_| BuildproofError::NotFound {
        kind: "executable",
        id: binary.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_quotes_whitespace() {
        let inv = Invocation::new("pack")
            .args(["build", "app"])
            .arg("--env")
            .arg("GREETING=hello world");
        assert_eq!(inv.command_line(), r#"pack build app --env "GREETING=hello world""#);
    }

    #[test]
    fn env_is_ordered() {
        let inv = Invocation::new("x").env("B", "2").env("A", "1");
        let keys: Vec<_> = inv.env.keys().cloned().collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_and_stderr() {
        let inv = Invocation::new("sh").args(["-c", "echo out; echo err 1>&2"]);
        let output = SystemExecutor.execute(&inv).expect("sh should run");
        assert!(output.contains("out\n"));
        assert!(output.contains("err\n"));
    }

    #[cfg(unix)]
    #[test]
    fn failure_surfaces_captured_output() {
        let inv = Invocation::new("sh").args(["-c", "echo partial progress; exit 3"]);
        match SystemExecutor.execute(&inv) {
            Err(BuildproofError::Process { exit_code, output, .. }) => {
                assert_eq!(exit_code, 3);
                assert!(output.contains("partial progress"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn env_and_working_dir_are_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inv = Invocation::new("sh")
            .args(["-c", "echo $GREETING; pwd"])
            .env("GREETING", "hello")
            .current_dir(dir.path());
        let output = SystemExecutor.execute(&inv).expect("sh should run");
        assert!(output.starts_with("hello\n"));
        let canonical = dir.path().canonicalize().expect("canonicalize");
        assert!(output.contains(&canonical.display().to_string()));
    }

    #[test]
    fn missing_program_is_io_error() {
        let inv = Invocation::new("/nonexistent/buildproof-tool");
        assert!(matches!(SystemExecutor.execute(&inv), Err(BuildproofError::Io { .. })));
    }

    #[test]
    fn locate_missing_binary_is_not_found() {
        let result = locate(Path::new("buildproof-definitely-not-installed"));
        assert!(matches!(result, Err(BuildproofError::NotFound { .. })));
    }
}
