#![allow(clippy::result_large_err)]

use super::WorkflowOptions;
use crate::core::error::AppError;
use crate::core::tasks::builtin::PACKAGE_MANAGERS;
use crate::core::types::ErrorCategory;
use url::Url;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(options: &WorkflowOptions) -> Result<(), AppError> {
        if let Some(manager) = &options.package_manager {
            if !PACKAGE_MANAGERS.contains(&manager.as_str()) {
                return Err(AppError::new(
                    ErrorCategory::ValidationError,
                    format!(
                        "package_manager '{}' is not one of {}",
                        manager,
                        PACKAGE_MANAGERS.join(", ")
                    ),
                )
                .with_code("CFG-VALID-001"));
            }
        }

        if let Some(registry) = &options.package_registry {
            let parsed = Url::parse(registry).map_err(|err| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    format!("package_registry '{}' is not a valid URL: {}", registry, err),
                )
                .with_code("CFG-VALID-002")
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::new(
                    ErrorCategory::ValidationError,
                    format!("package_registry must use http or https, got '{}'", parsed.scheme()),
                )
                .with_code("CFG-VALID-002"));
            }
        }

        if options.resolve_paths.iter().any(|path| path.as_os_str().is_empty()) {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "resolve_paths cannot contain empty entries",
            )
            .with_code("CFG-VALID-003"));
        }

        Ok(())
    }
}
