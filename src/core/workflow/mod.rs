#![allow(clippy::result_large_err)] // Workflow APIs return AppError directly for structured diagnostics without boxing.

//! Drives transformations through resolve, execute, commit and task phases.

pub mod events;

pub use events::{InvocationStage, WorkflowEvent};

use crate::core::config::WorkflowOptions;
use crate::core::engine::{Engine, EngineOutput, TransformationInvocation};
use crate::core::engine_host::EngineHost;
use crate::core::error::AppError;
use crate::core::host::{Host, LocalHost, NormalizedPath};
use crate::core::tasks::{
    register_builtins, BuiltinExecutorDeps, CommandRunner, TaskContext, TaskId, TaskScheduler,
};
use crate::core::tree::ReportEntry;
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Where a workflow reads and commits files.
pub enum HostSource {
    /// A real directory; tasks run there too.
    Root(PathBuf),
    /// Any host, with the real directory behind it when there is one.
    Host {
        host: Arc<dyn Host>,
        root: Option<PathBuf>,
    },
}

impl HostSource {
    fn into_parts(self) -> (Arc<dyn Host>, Option<PathBuf>) {
        match self {
            HostSource::Root(root) => (Arc::new(LocalHost::new(root.clone())), Some(root)),
            HostSource::Host { host, root } => (host, root),
        }
    }
}

#[derive(Default)]
pub struct WorkflowDeps {
    /// Runner used by built-in executors. Defaults to real processes.
    pub command_runner: Option<Arc<dyn CommandRunner>>,
}

/// Everything a finished workflow reported.
#[derive(Debug, Clone, Default)]
pub struct WorkflowSummary {
    pub id: Option<Uuid>,
    pub invocations: usize,
    pub actions: Vec<ReportEntry>,
    pub conflicts: Vec<NormalizedPath>,
    /// Host mutations performed across all commits.
    pub applied: usize,
    pub tasks: Vec<(TaskId, String)>,
    pub dry_run: bool,
    pub elapsed: Duration,
}

pub struct Workflow {
    host: Arc<dyn Host>,
    root: Option<PathBuf>,
    engine: Engine,
    options: WorkflowOptions,
    // Held for a whole `execute` so commits from concurrent calls never interleave.
    gate: Mutex<()>,
}

fn stage(invocation: &str, stage: InvocationStage) -> WorkflowEvent {
    WorkflowEvent::Stage {
        invocation: invocation.to_string(),
        stage,
    }
}

fn fail(mut err: AppError, invocation: &str, phase: &str) -> AppError {
    err.add_context("invocation", invocation);
    err.add_context("stage", phase);
    tracing::error!(invocation, stage = phase, error = %err, "invocation failed");
    err
}

impl Workflow {
    /// Workflow over a real directory.
    pub fn from_root(root: impl Into<PathBuf>, options: WorkflowOptions) -> Self {
        Self::new_with_deps(HostSource::Root(root.into()), options, WorkflowDeps::default())
    }

    /// Workflow over an explicit host, optionally backed by `root`.
    pub fn with_host(host: Arc<dyn Host>, root: Option<PathBuf>, options: WorkflowOptions) -> Self {
        Self::new_with_deps(
            HostSource::Host { host, root },
            options,
            WorkflowDeps::default(),
        )
    }

    pub fn new_with_deps(source: HostSource, options: WorkflowOptions, deps: WorkflowDeps) -> Self {
        let (host, root) = source.into_parts();
        let engine_host = Arc::new(
            EngineHost::new(options.resolve_paths.clone())
                .with_allow_private(options.allow_private),
        );
        register_builtins(
            engine_host.task_executors(),
            BuiltinExecutorDeps {
                root_directory: root.clone(),
                package_manager: options.package_manager.clone(),
                package_registry: options.package_registry.clone(),
                command_runner: deps.command_runner,
            },
        );
        tracing::debug!(
            root = ?root,
            force = options.force,
            dry_run = options.dry_run,
            "workflow constructed"
        );
        Self {
            host,
            root,
            engine: Engine::new(engine_host),
            options,
            gate: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// For registering collections, factories and extra task executors.
    pub fn engine_host(&self) -> &Arc<EngineHost> {
        self.engine.engine_host()
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    /// Lifecycle events for `invocation` and every transformation its tasks
    /// queue, processed first-in first-out. Each invocation commits before
    /// its tasks run, and those tasks finish before the next invocation
    /// starts. Dropping the stream before a commit leaves the host untouched.
    /// An error item is terminal.
    pub fn execute(
        &self,
        invocation: TransformationInvocation,
    ) -> impl Stream<Item = Result<WorkflowEvent, AppError>> + '_ {
        try_stream! {
            let _turn = self.gate.lock().await;
            let id = Uuid::new_v4();
            let started = Instant::now();
            let force = self.options.force;
            let dry_run = self.options.dry_run;
            tracing::info!(
                workflow = %id,
                invocation = %invocation,
                dry_run,
                force,
                "workflow started"
            );
            yield WorkflowEvent::WorkflowStart {
                id,
                invocation: invocation.clone(),
                dry_run,
                force,
            };

            let registry = self.engine.engine_host().task_executors().clone();
            let task_ctx = TaskContext::new(self.host.clone(), self.root.clone());
            let mut scheduler = TaskScheduler::new();
            let mut queue = VecDeque::from([invocation]);
            let mut processed = 0usize;

            while let Some(current) = queue.pop_front() {
                processed += 1;
                let label = current.to_string();
                yield stage(&label, InvocationStage::Pending);

                let resolved = self.engine.resolve_invocation(&current);
                if resolved.is_err() {
                    yield stage(&label, InvocationStage::Failed);
                }
                let (description, options) = resolved.map_err(|err| fail(err, &label, "resolve"))?;
                yield stage(&label, InvocationStage::Resolved);

                let executed = self
                    .engine
                    .execute(&description, &options, self.host.clone(), self.options.debug)
                    .await;
                if executed.is_err() {
                    yield stage(&label, InvocationStage::Failed);
                }
                let EngineOutput { mut tree, tasks } =
                    executed.map_err(|err| fail(err, &label, "execute"))?;
                yield stage(&label, InvocationStage::Executed);

                let report = tree.report(self.host.as_ref()).await;
                if report.is_err() {
                    yield stage(&label, InvocationStage::Failed);
                }
                let report = report.map_err(|err| fail(err, &label, "report"))?;
                for entry in report.entries {
                    yield WorkflowEvent::Action {
                        invocation: label.clone(),
                        entry,
                    };
                }
                if !force {
                    for path in report.conflicts {
                        yield WorkflowEvent::Conflict {
                            invocation: label.clone(),
                            path,
                        };
                    }
                }

                if dry_run {
                    tracing::debug!(
                        invocation = %label,
                        dropped_tasks = tasks.len(),
                        "dry run, discarding staged tree"
                    );
                    yield stage(&label, InvocationStage::Discarded);
                    yield stage(&label, InvocationStage::Done);
                    continue;
                }

                let committed = tree.commit(self.host.as_ref(), force).await;
                if committed.is_err() {
                    yield stage(&label, InvocationStage::Failed);
                }
                let outcome = committed.map_err(|err| fail(err, &label, "commit"))?;
                yield WorkflowEvent::Committed {
                    invocation: label.clone(),
                    applied: outcome.applied,
                    skipped: outcome.skipped,
                };
                yield stage(&label, InvocationStage::Committed);

                let scheduled = scheduler.schedule(tasks);
                if scheduled.is_err() {
                    yield stage(&label, InvocationStage::Failed);
                }
                let scheduled = scheduled.map_err(|err| fail(err, &label, "schedule"))?;
                yield WorkflowEvent::TasksScheduled {
                    invocation: label.clone(),
                    tasks: scheduled,
                };
                yield stage(&label, InvocationStage::TasksScheduled);

                loop {
                    let step = scheduler.run_next(&registry, &task_ctx).await;
                    if step.is_err() {
                        yield stage(&label, InvocationStage::Failed);
                    }
                    let step = match step.map_err(|err| fail(err, &label, "tasks"))? {
                        Some(step) => step,
                        None => break,
                    };
                    queue.extend(step.transformations);
                    yield WorkflowEvent::TaskCompleted {
                        id: step.id,
                        kind: step.kind,
                        elapsed: step.elapsed,
                    };
                }
                yield stage(&label, InvocationStage::Done);
            }

            let elapsed = started.elapsed();
            tracing::info!(
                workflow = %id,
                invocations = processed,
                elapsed = %humantime::format_duration(elapsed),
                "workflow finished"
            );
            yield WorkflowEvent::WorkflowEnd {
                id,
                invocations: processed,
                elapsed,
            };
        }
    }

    /// Drain [`Workflow::execute`] into a summary.
    pub async fn run(
        &self,
        invocation: TransformationInvocation,
    ) -> Result<WorkflowSummary, AppError> {
        let stream = self.execute(invocation);
        tokio::pin!(stream);

        let mut summary = WorkflowSummary {
            dry_run: self.options.dry_run,
            ..WorkflowSummary::default()
        };
        while let Some(event) = stream.next().await {
            match event? {
                WorkflowEvent::WorkflowStart { id, .. } => summary.id = Some(id),
                WorkflowEvent::Action { entry, .. } => summary.actions.push(entry),
                WorkflowEvent::Conflict { path, .. } => summary.conflicts.push(path),
                WorkflowEvent::Committed { applied, .. } => summary.applied += applied,
                WorkflowEvent::TaskCompleted { id, kind, .. } => summary.tasks.push((id, kind)),
                WorkflowEvent::WorkflowEnd {
                    invocations,
                    elapsed,
                    ..
                } => {
                    summary.invocations = invocations;
                    summary.elapsed = elapsed;
                }
                WorkflowEvent::Stage { .. } | WorkflowEvent::TasksScheduled { .. } => {}
            }
        }
        Ok(summary)
    }
}
