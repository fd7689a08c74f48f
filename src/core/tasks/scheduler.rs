#![allow(clippy::result_large_err)]

use super::{TaskBatch, TaskContext, TaskExecutorRegistry, TaskId, TaskRequest};
use crate::core::engine::TransformationInvocation;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// One executed task.
#[derive(Debug)]
pub struct TaskStep {
    pub id: TaskId,
    pub kind: String,
    pub elapsed: Duration,
    /// Follow-up task requests the executor scheduled.
    pub follow_ups: usize,
    pub transformations: Vec<TransformationInvocation>,
}

#[derive(Debug, Default)]
pub struct TaskRunReport {
    pub executed: Vec<(TaskId, String)>,
    pub transformations: Vec<TransformationInvocation>,
}

/// Pending task queue. A request becomes ready once every dependency has
/// completed; among ready requests the oldest runs first.
#[derive(Debug, Default)]
pub struct TaskScheduler {
    pending: Vec<TaskRequest>,
    completed: HashSet<TaskId>,
    next_id: u64,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Append a batch, assigning queue-wide ids. Rejects the whole batch when
    /// a dependency is unknown or the dependencies form a cycle.
    pub fn schedule(&mut self, batch: TaskBatch) -> Result<Vec<TaskId>, AppError> {
        let requests = batch.into_requests();
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let mut graph = DiGraph::<TaskId, ()>::new();
        let nodes: HashMap<TaskId, _> = requests
            .iter()
            .map(|request| (request.id, graph.add_node(request.id)))
            .collect();
        for request in &requests {
            let Some(&node) = nodes.get(&request.id) else {
                continue;
            };
            for dependency in &request.dependencies {
                let Some(&upstream) = nodes.get(dependency) else {
                    return Err(AppError::new(
                        ErrorCategory::ValidationError,
                        format!(
                            "task '{}' ({}) depends on unknown request {}",
                            request.kind, request.id, dependency
                        ),
                    )
                    .with_code("TASK-DEP-001"));
                };
                graph.add_edge(upstream, node, ());
            }
        }
        if let Err(cycle) = toposort(&graph, None) {
            let id = graph[cycle.node_id()];
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("task dependencies form a cycle through {}", id),
            )
            .with_code("TASK-DEP-002"));
        }

        let mut mapping = HashMap::with_capacity(requests.len());
        for request in &requests {
            mapping.insert(request.id, TaskId(self.next_id));
            self.next_id += 1;
        }
        let mut scheduled = Vec::with_capacity(requests.len());
        for request in requests {
            let Some(&id) = mapping.get(&request.id) else {
                continue;
            };
            let dependencies = request
                .dependencies
                .iter()
                .filter_map(|dependency| mapping.get(dependency).copied())
                .collect();
            tracing::debug!(task = %id, kind = %request.kind, "scheduled task");
            self.pending.push(TaskRequest {
                id,
                kind: request.kind,
                options: request.options,
                dependencies,
            });
            scheduled.push(id);
        }
        Ok(scheduled)
    }

    fn abort(&mut self) -> usize {
        let dropped = self.pending.len();
        if dropped > 0 {
            tracing::warn!(dropped, "aborting remaining task batch");
        }
        self.pending.clear();
        dropped
    }

    /// Run the next ready request. `Ok(None)` once the queue is drained.
    ///
    /// A missing executor or a failing one aborts every request still
    /// pending; work already done stays done.
    pub async fn run_next(
        &mut self,
        registry: &TaskExecutorRegistry,
        ctx: &TaskContext,
    ) -> Result<Option<TaskStep>, AppError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let ready = self.pending.iter().position(|request| {
            request
                .dependencies
                .iter()
                .all(|dependency| self.completed.contains(dependency))
        });
        let Some(index) = ready else {
            let dropped = self.abort();
            return Err(AppError::new(
                ErrorCategory::InternalError,
                format!("{} pending task(s) wait on dependencies that never completed", dropped),
            )
            .with_code("TASK-DEP-003"));
        };

        let request = self.pending.remove(index);
        let Some(executor) = registry.get(&request.kind) else {
            let dropped = self.abort();
            let mut err = AppError::new(
                ErrorCategory::UnknownTaskKind,
                format!("no executor registered for task kind '{}'", request.kind),
            )
            .with_code("TASK-KIND-001");
            err.add_context("task", &request.id.to_string());
            err.add_context("aborted_tasks", &dropped.to_string());
            return Err(err);
        };

        let mut task_ctx = ctx.clone();
        task_ctx.task_id = request.id;
        tracing::info!(task = %request.id, kind = %request.kind, "running task");
        let started = Instant::now();
        let output = match executor.execute(request.options, task_ctx).await {
            Ok(output) => output,
            Err(mut err) => {
                let dropped = self.abort();
                err.add_context("task", &request.id.to_string());
                err.add_context("kind", &request.kind);
                err.add_context("aborted_tasks", &dropped.to_string());
                return Err(err);
            }
        };
        let elapsed = started.elapsed();
        self.completed.insert(request.id);

        let follow_ups = self.schedule(output.tasks)?;
        tracing::info!(
            task = %request.id,
            kind = %request.kind,
            elapsed = %humantime::format_duration(elapsed),
            follow_ups = follow_ups.len(),
            "task completed"
        );
        Ok(Some(TaskStep {
            id: request.id,
            kind: request.kind,
            elapsed,
            follow_ups: follow_ups.len(),
            transformations: output.transformations,
        }))
    }

    /// Drain the queue, including anything executors add along the way.
    pub async fn run(
        &mut self,
        registry: &TaskExecutorRegistry,
        ctx: &TaskContext,
    ) -> Result<TaskRunReport, AppError> {
        let mut report = TaskRunReport::default();
        while let Some(step) = self.run_next(registry, ctx).await? {
            report.executed.push((step.id, step.kind));
            report.transformations.extend(step.transformations);
        }
        Ok(report)
    }
}
