use crate::core::types::{ErrorCategory, ErrorSeverity};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub context: HashMap<String, String>,
    /// Paths implicated in the failure, in the order they were detected.
    pub paths: Vec<String>,
    pub occurred_at: DateTime<Utc>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        // A conflict is resolved by re-running with force; everything else
        // needs the caller to change something.
        let severity = if category == ErrorCategory::ConflictError {
            ErrorSeverity::Warning
        } else {
            ErrorSeverity::Error
        };
        AppError {
            category,
            severity,
            code: format!("ERR-{}", uuid::Uuid::new_v4()),
            message: message.into(),
            context: HashMap::new(),
            paths: Vec::new(),
            occurred_at: Utc::now(),
            source: None,
        }
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(anyhow::anyhow!(source));
        error
    }

    pub fn with_context<T: Into<String>>(mut self, context: T) -> Self {
        self.context.insert("context".to_string(), context.into());
        self
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: ToString,
    {
        self.paths = paths.into_iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }

    pub fn is(&self, category: ErrorCategory) -> bool {
        self.category == category
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.paths.is_empty() {
            write!(f, " (paths: {})", self.paths.join(", "))?;
        }
        if !self.context.is_empty() {
            write!(f, " (Context: {:?})", self.context)?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        let mut error = AppError::new(ErrorCategory::InternalError, e.to_string())
            .with_code("ANYHOW_ERROR");
        error.source = Some(e);
        error
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        let category = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorCategory::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCategory::PermissionDenied,
            _ => ErrorCategory::IoError,
        };
        let mut error = AppError::new(category, e.to_string()).with_code("IO_ERROR");
        error.source = Some(anyhow::anyhow!(e));
        error
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::new(ErrorCategory::SerializationError, e.to_string()).with_code("SERDE_ERROR")
    }
}

/// Presents an [`AppError`] to whoever drives the workflow.
pub trait ErrorReporter {
    fn report_error(&self, error: &AppError);
    fn report_warning(&self, message: &str, context: Option<String>);
    fn report_info(&self, message: &str);
}

/// Writes reports to stderr, one implicated path per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorReporter;

impl DefaultErrorReporter {
    pub fn new() -> Self {
        DefaultErrorReporter
    }

    /// The lines [`ErrorReporter::report_error`] prints, context keys sorted.
    pub fn render(error: &AppError) -> Vec<String> {
        let label = match error.severity {
            ErrorSeverity::Warning => "warning",
            _ => "error",
        };
        let mut lines = vec![format!("{}[{}]: {}", label, error.code, error.message)];
        lines.extend(error.paths.iter().map(|path| format!("  --> {}", path)));
        let mut keys: Vec<&String> = error.context.keys().collect();
        keys.sort();
        for key in keys {
            lines.push(format!("  = {}: {}", key, error.context[key]));
        }
        if let Some(source) = &error.source {
            lines.push(format!("  caused by: {}", source));
        }
        lines
    }
}

impl ErrorReporter for DefaultErrorReporter {
    fn report_error(&self, error: &AppError) {
        for line in Self::render(error) {
            eprintln!("{}", line);
        }
    }

    fn report_warning(&self, message: &str, context: Option<String>) {
        eprintln!("warning: {}", message);
        if let Some(context) = context {
            eprintln!("  = {}", context);
        }
    }

    fn report_info(&self, message: &str) {
        eprintln!("{}", message);
    }
}
