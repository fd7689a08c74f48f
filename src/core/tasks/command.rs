#![allow(clippy::result_large_err)] // Command runner returns AppError to surface process diagnostics without boxing.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

const OUTPUT_CAPTURE_LIMIT_BYTES: usize = 65_536;

/// One external program invocation made by a task executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    /// Capture output instead of inheriting the parent's stdio.
    pub capture: bool,
}

impl CommandRequest {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
            capture: true,
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

    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, AppError>;
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, AppError> {
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .current_dir(&request.cwd)
            .envs(&request.env)
            .stdin(Stdio::null());
        if request.capture {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        tracing::debug!(
            command = %request.display(),
            cwd = %request.cwd.display(),
            "spawning command"
        );
        let output = command.output().await.map_err(|err| {
            AppError::new(
                ErrorCategory::TaskError,
                format!("failed to execute '{}': {}", request.program, err),
            )
            .with_code("TASK-CMD-002")
        })?;

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

fn limit_bytes(bytes: &[u8]) -> String {
    let end = bytes.len().min(OUTPUT_CAPTURE_LIMIT_BYTES);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Run `request` and turn a non-zero exit into a `TaskError`.
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    request: &CommandRequest,
) -> Result<CommandOutput, AppError> {
    let output = runner.run(request).await?;
    if output.success() {
        return Ok(output);
    }
    let mut err = AppError::new(
        ErrorCategory::TaskError,
        format!(
            "'{}' failed with exit code {}",
            request.display(),
            output.exit_code
        ),
    )
    .with_code("TASK-CMD-001");
    err.add_context("stderr", &limit_bytes(&output.stderr));
    Err(err)
}
