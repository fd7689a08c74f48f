use crate::logging::layers::console::ConsoleOutput;
use crate::Result;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::filter::Directive;

const DEFAULT_LEVEL: &str = "info";

/// Logging settings after `.reshape/logging.toml` and env overrides are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub default_level: String,
    pub enable_file: bool,
    pub console_output: Option<ConsoleOutput>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            default_level: DEFAULT_LEVEL.to_string(),
            enable_file: true,
            console_output: None,
        }
    }
}

impl LoggingConfig {
    /// Precedence: defaults, then the workspace file, then `RESHAPE_LOG_*`.
    pub fn load(workspace_root: Option<&Path>) -> Result<Self> {
        let mut config = LoggingConfig::default();
        if let Some(workspace) = workspace_root {
            let path = workspace.join(".reshape").join("logging.toml");
            if let Some(section) = read_section(&path)? {
                config.apply(section);
            }
        }
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, section: LoggingSection) {
        if let Some(log_dir) = section.log_dir {
            self.log_dir = Some(PathBuf::from(log_dir));
        }
        if let Some(level) = section.default_level {
            self.default_level = level;
        }
        if let Some(enable_file) = section.enable_file {
            self.enable_file = enable_file;
        }
        if section.console_output.is_some() {
            self.console_output = section.console_output;
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = non_empty_env("RESHAPE_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = non_empty_env("RESHAPE_LOG_LEVEL") {
            self.default_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        Directive::from_str(&self.default_level).map_err(|_| {
            anyhow!(
                "logging.default_level '{}' is not a valid tracing directive",
                self.default_level
            )
        })?;
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_section(path: &Path) -> Result<Option<LoggingSection>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read logging config {}", path.display()))?;
    let parsed: LoggingFile = toml::from_str(&content)
        .with_context(|| format!("failed to parse logging config {}", path.display()))?;
    Ok(parsed.logging)
}

#[derive(Debug, Deserialize)]
struct LoggingFile {
    logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize)]
struct LoggingSection {
    log_dir: Option<String>,
    default_level: Option<String>,
    enable_file: Option<bool>,
    #[serde(default)]
    console_output: Option<ConsoleOutput>,
}
