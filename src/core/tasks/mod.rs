#![allow(clippy::result_large_err)] // Executor trait and scheduler return AppError directly for structured diagnostics without boxing.

//! Deferred side effects requested by transformations and run after commit.

pub mod builtin;
pub mod command;
pub mod scheduler;

pub use builtin::{register_builtins, BuiltinExecutorDeps};
pub use command::{CommandOutput, CommandRequest, CommandRunner, TokioCommandRunner};
pub use scheduler::{TaskRunReport, TaskScheduler, TaskStep};

use crate::core::engine::TransformationInvocation;
use crate::core::error::AppError;
use crate::core::host::Host;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: TaskId,
    pub kind: String,
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
}

/// Task requests collected from one transformation run or one executor.
///
/// Ids are local to the batch; the scheduler maps them to queue-wide ids.
#[derive(Debug, Clone, Default)]
pub struct TaskBatch {
    requests: Vec<TaskRequest>,
    next_id: u64,
}

impl TaskBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: impl Into<String>, options: Value) -> TaskId {
        self.add_with_dependencies(kind, options, [])
    }

    pub fn add_with_dependencies(
        &mut self,
        kind: impl Into<String>,
        options: Value,
        dependencies: impl IntoIterator<Item = TaskId>,
    ) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.requests.push(TaskRequest {
            id,
            kind: kind.into(),
            options,
            dependencies: dependencies.into_iter().collect(),
        });
        id
    }

    pub fn requests(&self) -> &[TaskRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub(crate) fn into_requests(self) -> Vec<TaskRequest> {
        self.requests
    }
}

/// Environment an executor runs in.
#[derive(Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub host: Arc<dyn Host>,
    /// Real directory behind `host`, when there is one.
    pub root_directory: Option<PathBuf>,
}

impl TaskContext {
    pub fn new(host: Arc<dyn Host>, root_directory: Option<PathBuf>) -> Self {
        Self {
            task_id: TaskId(0),
            host,
            root_directory,
        }
    }
}

/// Follow-up work produced by an executor.
#[derive(Debug, Default)]
pub struct TaskOutput {
    pub tasks: TaskBatch,
    pub transformations: Vec<TransformationInvocation>,
}

#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Task kind this executor handles.
    fn kind(&self) -> &str;

    async fn execute(&self, options: Value, ctx: TaskContext) -> Result<TaskOutput, AppError>;
}

/// Executors by kind, owned by one engine host. Cloning shares the map.
#[derive(Clone, Default)]
pub struct TaskExecutorRegistry {
    inner: Arc<DashMap<String, Arc<dyn TaskExecutor>>>,
}

impl TaskExecutorRegistry {
    /// Last registration for a kind wins.
    pub fn register(&self, executor: Arc<dyn TaskExecutor>) -> Option<Arc<dyn TaskExecutor>> {
        let kind = executor.kind().to_string();
        let previous = self.inner.insert(kind.clone(), executor);
        if previous.is_some() {
            tracing::warn!(kind = %kind, "replaced previously registered task executor");
        } else {
            tracing::debug!(kind = %kind, "registered task executor");
        }
        previous
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.inner.get(kind).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.inner.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.inner.iter().map(|entry| entry.key().clone()).collect();
        kinds.sort();
        kinds
    }
}
