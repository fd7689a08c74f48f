use super::{parse_options, working_directory, LINT_FIX};
use crate::core::error::AppError;
use crate::core::host::NormalizedPath;
use crate::core::tasks::command::{run_checked, CommandRequest, CommandRunner};
use crate::core::tasks::{TaskContext, TaskExecutor, TaskOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LintFixOptions {
    linter: String,
    files: Vec<String>,
    args: Vec<String>,
    working_directory: Option<String>,
}

impl Default for LintFixOptions {
    fn default() -> Self {
        Self {
            linter: "eslint".to_string(),
            files: Vec::new(),
            args: Vec::new(),
            working_directory: None,
        }
    }
}

/// Runs a linter with `--fix` over the listed files, or the whole root.
pub struct LintFixExecutor {
    runner: Arc<dyn CommandRunner>,
}

impl LintFixExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TaskExecutor for LintFixExecutor {
    fn kind(&self) -> &str {
        LINT_FIX
    }

    async fn execute(&self, options: Value, ctx: TaskContext) -> Result<TaskOutput, AppError> {
        let options: LintFixOptions = parse_options(self.kind(), options)?;
        let cwd = working_directory(None, &ctx, options.working_directory.as_deref())?;

        let mut targets = Vec::with_capacity(options.files.len());
        for file in &options.files {
            // Host paths are absolute within the root; the linter wants them relative.
            let path = NormalizedPath::parse(file)?;
            targets.push(path.as_str().trim_start_matches('/').to_string());
        }
        if targets.is_empty() {
            targets.push(".".to_string());
        }

        let request = CommandRequest::new("npx", cwd)
            .arg(options.linter.as_str())
            .arg("--fix")
            .args(options.args.iter().map(String::as_str))
            .args(targets);
        tracing::info!(command = %request.display(), "running lint fix");
        run_checked(self.runner.as_ref(), &request).await?;
        Ok(TaskOutput::default())
    }
}
