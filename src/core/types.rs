use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Unknown collection or transformation, or an unresolvable reference.
    ResolutionError,
    /// Options rejected by a transformation schema.
    ValidationError,
    /// Invalid staging operation (double create, delete of a missing path).
    StagingError,
    /// Commit-time mismatch between staged intent and host state.
    ConflictError,
    /// A task request names a kind with no registered executor.
    UnknownTaskKind,
    /// A task executor failed.
    TaskError,
    NotFound,
    PermissionDenied,
    IoError,
    SerializationError,
    InternalError,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How serious an error is for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    /// Recoverable by changing policy, e.g. re-running with force.
    Warning,
}

/// Kind of file action recorded in a staging tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Overwrite,
    Delete,
    Rename,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ActionKind::Create => "create",
            ActionKind::Overwrite => "overwrite",
            ActionKind::Delete => "delete",
            ActionKind::Rename => "rename",
        };
        f.write_str(label)
    }
}
