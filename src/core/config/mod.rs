//! Workflow settings from `reshape.toml` and the environment.

pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level layout of `reshape.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReshapeConfig {
    #[serde(default)]
    pub workflow: WorkflowOptions,
}

/// Policy fixed when a workflow is constructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowOptions {
    /// Overwrite host content that conflicts with staged actions.
    pub force: bool,
    /// Report staged actions without committing or running tasks.
    pub dry_run: bool,
    /// Package manager for the package-install task (`npm` when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<String>,
    /// Registry URL passed to the package manager.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_registry: Option<String>,
    /// Extra roots searched for collection manifests.
    pub resolve_paths: Vec<PathBuf>,
    /// Exposed to transformations through their context.
    pub debug: bool,
    /// Allow private transformations to be invoked directly.
    pub allow_private: bool,
}

impl WorkflowOptions {
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_package_manager(mut self, manager: impl Into<String>) -> Self {
        self.package_manager = Some(manager.into());
        self
    }

    pub fn with_package_registry(mut self, registry: impl Into<String>) -> Self {
        self.package_registry = Some(registry.into());
        self
    }

    pub fn with_resolve_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.resolve_paths.push(path.into());
        self
    }

    pub fn with_allow_private(mut self, allow_private: bool) -> Self {
        self.allow_private = allow_private;
        self
    }
}
