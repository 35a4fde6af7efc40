//! # Runner
//!
//! Spawns the compiler, the compiled binary, and the Python interpreter as
//! child processes and captures what they print.
//!
//! Failures are not classified further than the stage they happened in: the
//! captured stderr is handed to the user verbatim behind [`ERROR_MARKER`].

use crate::error::{Error, ErrorKind, Result};
use crate::toolchain::Toolchain;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Prefix put in front of stderr when a compile or run fails.
pub const ERROR_MARKER: &str = "An error occurred:\n";

/// Everything a finished child process left behind.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stderr, then stdout (MSVC reports diagnostics there), then a status line
    fn failure_text(&self) -> String {
        if !self.stderr.trim().is_empty() {
            return self.stderr.clone();
        }
        if !self.stdout.trim().is_empty() {
            return self.stdout.clone();
        }
        match self.code {
            Some(code) => format!("process exited with status {}", code),
            None => "process terminated by signal".to_string(),
        }
    }
}

/// Run `program` with `args` to completion, capturing stdout and stderr.
///
/// A non-zero exit is *not* an error here; only failing to spawn is.
pub async fn run_process(program: &str, args: &[String], cwd: Option<&Path>) -> Result<ProcessOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    tracing::debug!(program, ?args, "spawning process");

    let started = Instant::now();
    let output = cmd.output().await.map_err(|e| {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::ExecutionFailed,
        };
        Error::new(kind, format!("failed to start '{}': {}", program, e))
            .with_operation("runner::run_process")
            .with_context("program", program.to_string())
            .set_source(e)
    })?;
    let elapsed = started.elapsed();

    let result = ProcessOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        elapsed,
    };
    tracing::debug!(program, code = ?result.code, elapsed_ms = elapsed.as_millis() as u64, "process finished");
    Ok(result)
}

/// Which step of a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Compile,
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Compile => f.write_str("compile"),
            Stage::Run => f.write_str("run"),
        }
    }
}

/// Result of compiling and/or running a program, as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Success {
        stdout: String,
        #[serde(serialize_with = "serialize_secs")]
        elapsed: Duration,
    },
    Failed {
        stage: Stage,
        stderr: String,
    },
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunOutcome {
    fn from_process(stage: Stage, result: Result<ProcessOutput>) -> Self {
        match result {
            Ok(output) if output.success() => RunOutcome::Success {
                stdout: output.stdout,
                elapsed: output.elapsed,
            },
            Ok(output) => RunOutcome::Failed {
                stage,
                stderr: output.failure_text(),
            },
            Err(e) => {
                tracing::warn!(%stage, error = %e, "process could not be started");
                RunOutcome::Failed {
                    stage,
                    stderr: e.message().to_string(),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    pub fn stdout(&self) -> Option<&str> {
        match self {
            RunOutcome::Success { stdout, .. } => Some(stdout),
            RunOutcome::Failed { .. } => None,
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            RunOutcome::Success { elapsed, .. } => Some(*elapsed),
            RunOutcome::Failed { .. } => None,
        }
    }

    /// stdout on success, otherwise [`ERROR_MARKER`] followed by stderr.
    pub fn render(&self) -> String {
        match self {
            RunOutcome::Success { stdout, .. } => stdout.clone(),
            RunOutcome::Failed { stderr, .. } => format!("{}{}", ERROR_MARKER, stderr),
        }
    }

    /// Typed view for callers that need an exit status.
    pub fn into_result(self, program: &str) -> Result<String> {
        match self {
            RunOutcome::Success { stdout, .. } => Ok(stdout),
            RunOutcome::Failed {
                stage: Stage::Compile,
                stderr,
            } => Err(Error::compile_failed(program, stderr).with_operation("runner::compile")),
            RunOutcome::Failed {
                stage: Stage::Run,
                stderr,
            } => Err(Error::execution_failed(program, stderr).with_operation("runner::execute")),
        }
    }
}

/// Compile `source` into `binary` with the given toolchain.
pub async fn compile(toolchain: &Toolchain, source: &Path, binary: &Path) -> Result<ProcessOutput> {
    let argv = toolchain.compile_command(source, binary);
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::invalid_argument("empty compile command"))?;

    tracing::info!(compiler = %toolchain.compiler.name, source = %source.display(), "compiling");
    run_process(program, args, None).await.map_err(|e| {
        if e.kind() == ErrorKind::FileNotFound {
            Error::new(ErrorKind::ToolchainUnavailable, e.message().to_string())
                .with_operation("runner::compile")
                .with_context("compiler", toolchain.compiler.name.clone())
        } else {
            e.with_operation("runner::compile")
        }
    })
}

/// Execute a compiled binary with no arguments.
pub async fn execute(binary: &Path) -> Result<ProcessOutput> {
    let program = binary.to_string_lossy();
    tracing::info!(binary = %program, "executing");
    run_process(&program, &[], None)
        .await
        .map_err(|e| e.with_operation("runner::execute"))
}

/// Compile, then run if compilation succeeded.
pub async fn compile_and_run(toolchain: &Toolchain, source: &Path, binary: &Path) -> RunOutcome {
    let compiled = RunOutcome::from_process(Stage::Compile, compile(toolchain, source, binary).await);
    if !compiled.is_success() {
        return compiled;
    }
    RunOutcome::from_process(Stage::Run, execute(binary).await)
}

/// Run a Python script with the given interpreter.
pub async fn run_python(interpreter: &str, script: &Path) -> RunOutcome {
    tracing::info!(interpreter, script = %script.display(), "running python");
    let args = vec![script.to_string_lossy().into_owned()];
    RunOutcome::from_process(Stage::Run, run_process(interpreter, &args, None).await)
}
