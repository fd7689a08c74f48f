#![allow(clippy::result_large_err)]

//! Executors every workflow registers at construction.

pub mod lint_fix;
pub mod package_install;
pub mod repository_init;
pub mod run_transformation;

pub use lint_fix::LintFixExecutor;
pub use package_install::{PackageInstallConfig, PackageInstallExecutor, PACKAGE_MANAGERS};
pub use repository_init::RepositoryInitExecutor;
pub use run_transformation::RunTransformationExecutor;

use super::command::{CommandRunner, TokioCommandRunner};
use super::{TaskContext, TaskExecutorRegistry};
use crate::core::error::AppError;
use crate::core::host::NormalizedPath;
use crate::core::types::ErrorCategory;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PACKAGE_INSTALL: &str = "package-install";
pub const REPOSITORY_INIT: &str = "repository-init";
pub const RUN_TRANSFORMATION: &str = "run-transformation";
pub const LINT_FIX: &str = "lint-fix";

#[derive(Default)]
pub struct BuiltinExecutorDeps {
    pub root_directory: Option<PathBuf>,
    pub package_manager: Option<String>,
    pub package_registry: Option<String>,
    /// Defaults to spawning real processes.
    pub command_runner: Option<Arc<dyn CommandRunner>>,
}

/// Register the four built-in executors into `registry`.
pub fn register_builtins(registry: &TaskExecutorRegistry, deps: BuiltinExecutorDeps) {
    let runner: Arc<dyn CommandRunner> = deps
        .command_runner
        .unwrap_or_else(|| Arc::new(TokioCommandRunner));
    registry.register(Arc::new(PackageInstallExecutor::new(
        PackageInstallConfig {
            root_directory: deps.root_directory.clone(),
            package_manager: deps.package_manager,
            registry: deps.package_registry,
            allow_package_manager_override: true,
        },
        runner.clone(),
    )));
    registry.register(Arc::new(RepositoryInitExecutor::new(
        deps.root_directory,
        runner.clone(),
    )));
    registry.register(Arc::new(RunTransformationExecutor));
    registry.register(Arc::new(LintFixExecutor::new(runner)));
}

/// Decode executor options; `null` means all defaults.
pub(crate) fn parse_options<T>(kind: &str, options: Value) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    if options.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(options).map_err(|err| {
        AppError::new(
            ErrorCategory::ValidationError,
            format!("invalid options for task '{}': {}", kind, err),
        )
        .with_code("TASK-OPTS-001")
    })
}

/// Directory a command runs in: the configured root, else the workflow's,
/// optionally narrowed to a relative sub-directory.
pub(crate) fn working_directory(
    configured_root: Option<&Path>,
    ctx: &TaskContext,
    relative: Option<&str>,
) -> Result<PathBuf, AppError> {
    let root = configured_root
        .map(Path::to_path_buf)
        .or_else(|| ctx.root_directory.clone())
        .ok_or_else(|| {
            AppError::new(
                ErrorCategory::TaskError,
                "task needs a root directory but the workflow host has none",
            )
            .with_code("TASK-CFG-001")
        })?;
    let Some(relative) = relative else {
        return Ok(root);
    };
    let normalized = NormalizedPath::parse(relative)?;
    let mut resolved = root;
    for segment in normalized.segments() {
        resolved.push(segment);
    }
    Ok(resolved)
}
