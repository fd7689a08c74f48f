use super::{parse_options, working_directory, REPOSITORY_INIT};
use crate::core::error::AppError;
use crate::core::tasks::command::{run_checked, CommandRequest, CommandRunner};
use crate::core::tasks::{TaskContext, TaskExecutor, TaskOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RepositoryInitOptions {
    working_directory: Option<String>,
    commit: bool,
    message: Option<String>,
    author_name: Option<String>,
    author_email: Option<String>,
}

/// `git init`, plus an initial commit when asked. A directory that already
/// holds a repository is left alone.
pub struct RepositoryInitExecutor {
    root_directory: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
}

impl RepositoryInitExecutor {
    pub fn new(root_directory: Option<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            root_directory,
            runner,
        }
    }

    fn git(&self, cwd: &Path, options: &RepositoryInitOptions) -> CommandRequest {
        let mut request = CommandRequest::new("git", cwd);
        if let Some(name) = &options.author_name {
            request = request
                .env("GIT_AUTHOR_NAME", name.as_str())
                .env("GIT_COMMITTER_NAME", name.as_str());
        }
        if let Some(email) = &options.author_email {
            request = request
                .env("GIT_AUTHOR_EMAIL", email.as_str())
                .env("GIT_COMMITTER_EMAIL", email.as_str());
        }
        request
    }
}

#[async_trait]
impl TaskExecutor for RepositoryInitExecutor {
    fn kind(&self) -> &str {
        REPOSITORY_INIT
    }

    async fn execute(&self, options: Value, ctx: TaskContext) -> Result<TaskOutput, AppError> {
        let options: RepositoryInitOptions = parse_options(self.kind(), options)?;
        let cwd = working_directory(
            self.root_directory.as_deref(),
            &ctx,
            options.working_directory.as_deref(),
        )?;

        if tokio::fs::try_exists(cwd.join(".git")).await.unwrap_or(false) {
            tracing::info!(cwd = %cwd.display(), "repository already initialized");
            return Ok(TaskOutput::default());
        }

        run_checked(self.runner.as_ref(), &self.git(&cwd, &options).arg("init")).await?;
        if options.commit {
            let message = options
                .message
                .clone()
                .unwrap_or_else(|| "initial commit".to_string());
            run_checked(
                self.runner.as_ref(),
                &self.git(&cwd, &options).args(["add", "."]),
            )
            .await?;
            run_checked(
                self.runner.as_ref(),
                &self.git(&cwd, &options).args(["commit", "-m", message.as_str()]),
            )
            .await?;
        }
        tracing::info!(cwd = %cwd.display(), commit = options.commit, "initialized repository");
        Ok(TaskOutput::default())
    }
}
