#![allow(clippy::result_large_err)]

use super::{ConfigValidator, ReshapeConfig, WorkflowOptions};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `<workspace>/reshape.toml`, then apply environment overrides.
    /// A missing file means defaults.
    pub fn load_from_workspace(workspace_path: &Path) -> Result<WorkflowOptions, AppError> {
        let config_path = workspace_path.join("reshape.toml");
        let mut options = Self::load_from_file(&config_path)?
            .map(|config| config.workflow)
            .unwrap_or_default();
        Self::apply_env_overrides(&mut options);
        Ok(options)
    }

    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> Result<Option<ReshapeConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
            .with_code("CFG-READ-001")
        })?;

        let config: ReshapeConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("CFG-PARSE-001")
        })?;

        Ok(Some(config))
    }

    fn apply_env_overrides(options: &mut WorkflowOptions) {
        if let Some(force) = env_bool("RESHAPE_FORCE") {
            options.force = force;
        }

        if let Some(dry_run) = env_bool("RESHAPE_DRY_RUN") {
            options.dry_run = dry_run;
        }

        if let Ok(manager) = env::var("RESHAPE_PACKAGE_MANAGER") {
            options.package_manager = Some(manager);
        }

        if let Ok(registry) = env::var("RESHAPE_PACKAGE_REGISTRY") {
            options.package_registry = Some(registry);
        }

        if let Some(paths) = env::var_os("RESHAPE_RESOLVE_PATHS") {
            options.resolve_paths = env::split_paths(&paths)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
        }
    }

    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "RESHAPE_FORCE - Overwrite conflicting host content at commit (true/false)",
            "RESHAPE_DRY_RUN - Report staged actions without committing (true/false)",
            "RESHAPE_PACKAGE_MANAGER - Package manager for package-install (npm, yarn, pnpm, cnpm, bun)",
            "RESHAPE_PACKAGE_REGISTRY - Registry URL passed to the package manager",
            "RESHAPE_RESOLVE_PATHS - Extra collection search roots, platform path-list separated",
            "RESHAPE_LOG_DIR - Override the log directory",
            "RESHAPE_LOG_LEVEL - Override the default log level",
        ]
    }

    pub fn validate_config(options: &WorkflowOptions) -> Result<(), AppError> {
        ConfigValidator::validate(options)
    }
}

/// Unparsable values are ignored.
fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok()?.trim().parse::<bool>().ok()
}
