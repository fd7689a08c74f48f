use super::{parse_options, working_directory, PACKAGE_INSTALL};
use crate::core::error::AppError;
use crate::core::tasks::command::{run_checked, CommandRequest, CommandRunner};
use crate::core::tasks::{TaskContext, TaskExecutor, TaskOutput};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub const PACKAGE_MANAGERS: [&str; 5] = ["npm", "yarn", "pnpm", "cnpm", "bun"];

fn quiet_argument(manager: &str) -> Option<&'static str> {
    match manager {
        "npm" => Some("--quiet"),
        "yarn" | "pnpm" | "bun" => Some("--silent"),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct PackageInstallConfig {
    pub root_directory: Option<PathBuf>,
    pub package_manager: Option<String>,
    pub registry: Option<String>,
    /// Let a task request pick its own package manager.
    pub allow_package_manager_override: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PackageInstallOptions {
    command: String,
    package_name: Option<String>,
    working_directory: Option<String>,
    package_manager: Option<String>,
    quiet: bool,
    hide_output: bool,
}

impl Default for PackageInstallOptions {
    fn default() -> Self {
        Self {
            command: "install".to_string(),
            package_name: None,
            working_directory: None,
            package_manager: None,
            quiet: true,
            hide_output: true,
        }
    }
}

/// Runs the configured package manager, `install` by default.
pub struct PackageInstallExecutor {
    config: PackageInstallConfig,
    runner: Arc<dyn CommandRunner>,
}

impl PackageInstallExecutor {
    pub fn new(config: PackageInstallConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    fn select_manager(&self, requested: Option<&str>) -> Result<String, AppError> {
        let manager = match requested {
            Some(requested) if self.config.allow_package_manager_override => requested,
            _ => self.config.package_manager.as_deref().unwrap_or("npm"),
        };
        if !PACKAGE_MANAGERS.contains(&manager) {
            return Err(AppError::new(
                ErrorCategory::TaskError,
                format!(
                    "unsupported package manager '{}'; expected one of {}",
                    manager,
                    PACKAGE_MANAGERS.join(", ")
                ),
            )
            .with_code("TASK-PKG-001"));
        }
        Ok(manager.to_string())
    }
}

#[async_trait]
impl TaskExecutor for PackageInstallExecutor {
    fn kind(&self) -> &str {
        PACKAGE_INSTALL
    }

    async fn execute(&self, options: Value, ctx: TaskContext) -> Result<TaskOutput, AppError> {
        let options: PackageInstallOptions = parse_options(self.kind(), options)?;
        let manager = self.select_manager(options.package_manager.as_deref())?;
        let cwd = working_directory(
            self.config.root_directory.as_deref(),
            &ctx,
            options.working_directory.as_deref(),
        )?;

        let mut request = CommandRequest::new(manager.as_str(), cwd)
            .arg(options.command.as_str())
            .capture(options.hide_output);
        if let Some(package) = &options.package_name {
            request = request.arg(package.as_str());
        }
        if options.quiet {
            if let Some(flag) = quiet_argument(&manager) {
                request = request.arg(flag);
            }
        }
        if let Some(registry) = &self.config.registry {
            request = request.arg(format!("--registry={}", registry));
        }

        tracing::info!(command = %request.display(), "installing packages");
        run_checked(self.runner.as_ref(), &request).await?;
        Ok(TaskOutput::default())
    }
}
