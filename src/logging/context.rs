use std::env;

/// How the process is being driven, which decides whether logs reach the console.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// A person is watching a terminal.
    Interactive,
    /// CI or another unattended driver; the console stays quiet.
    Batch,
}

impl ExecutionContext {
    pub fn disables_console(self) -> bool {
        matches!(self, ExecutionContext::Batch)
    }
}

/// `RESHAPE_BATCH=1` or a set `CI` variable selects [`ExecutionContext::Batch`].
pub fn detect_context() -> ExecutionContext {
    let batch_override = env::var("RESHAPE_BATCH")
        .map(|value| value.trim() == "1")
        .unwrap_or(false);
    let in_ci = env::var_os("CI").is_some_and(|value| !value.is_empty());
    if batch_override || in_ci {
        ExecutionContext::Batch
    } else {
        ExecutionContext::Interactive
    }
}
