use crate::core::engine::TransformationInvocation;
use crate::core::host::NormalizedPath;
use crate::core::tasks::TaskId;
use crate::core::tree::ReportEntry;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Where one invocation is in its lifecycle. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStage {
    Pending,
    Resolved,
    Executed,
    Committed,
    /// Dry run: the staged tree was reported and dropped.
    Discarded,
    TasksScheduled,
    Done,
    Failed,
}

impl fmt::Display for InvocationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InvocationStage::Pending => "pending",
            InvocationStage::Resolved => "resolved",
            InvocationStage::Executed => "executed",
            InvocationStage::Committed => "committed",
            InvocationStage::Discarded => "discarded",
            InvocationStage::TasksScheduled => "tasks-scheduled",
            InvocationStage::Done => "done",
            InvocationStage::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    WorkflowStart {
        id: Uuid,
        invocation: TransformationInvocation,
        dry_run: bool,
        force: bool,
    },
    Stage {
        invocation: String,
        stage: InvocationStage,
    },
    /// A pending host change, reported before commit.
    Action {
        invocation: String,
        entry: ReportEntry,
    },
    Conflict {
        invocation: String,
        path: NormalizedPath,
    },
    Committed {
        invocation: String,
        applied: usize,
        skipped: usize,
    },
    TasksScheduled {
        invocation: String,
        tasks: Vec<TaskId>,
    },
    TaskCompleted {
        id: TaskId,
        kind: String,
        elapsed: Duration,
    },
    WorkflowEnd {
        id: Uuid,
        invocations: usize,
        elapsed: Duration,
    },
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowEvent::WorkflowStart {
                invocation,
                dry_run,
                force,
                ..
            } => write!(f, "start {} (dry_run={}, force={})", invocation, dry_run, force),
            WorkflowEvent::Stage { invocation, stage } => write!(f, "{} {}", invocation, stage),
            WorkflowEvent::Action { entry, .. } => write!(f, "{}", entry),
            WorkflowEvent::Conflict { path, .. } => write!(f, "ERROR! {} already exists.", path),
            WorkflowEvent::Committed {
                invocation,
                applied,
                skipped,
            } => write!(
                f,
                "{} committed ({} applied, {} unchanged)",
                invocation, applied, skipped
            ),
            WorkflowEvent::TasksScheduled { invocation, tasks } => {
                write!(f, "{} scheduled {} task(s)", invocation, tasks.len())
            }
            WorkflowEvent::TaskCompleted { id, kind, elapsed } => write!(
                f,
                "{} {} finished in {}",
                kind,
                id,
                humantime::format_duration(*elapsed)
            ),
            WorkflowEvent::WorkflowEnd {
                invocations,
                elapsed,
                ..
            } => write!(
                f,
                "end ({} invocation(s) in {})",
                invocations,
                humantime::format_duration(*elapsed)
            ),
        }
    }
}
