use async_trait::async_trait;
use reshape::core::error::AppError;
use reshape::core::host::MemoryHost;
use reshape::core::tasks::builtin::{PACKAGE_INSTALL, REPOSITORY_INIT, RUN_TRANSFORMATION};
use reshape::core::tasks::{
    register_builtins, BuiltinExecutorDeps, CommandOutput, CommandRequest, CommandRunner,
    TaskBatch, TaskContext, TaskExecutor, TaskExecutorRegistry, TaskId, TaskOutput,
    TaskScheduler,
};
use reshape::core::types::ErrorCategory;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

type Journal = Arc<Mutex<Vec<String>>>;

/// Records the `label` option of every task it runs.
struct Journaling {
    kind: &'static str,
    journal: Journal,
    follow_up: Option<&'static str>,
}

#[async_trait]
impl TaskExecutor for Journaling {
    fn kind(&self) -> &str {
        self.kind
    }

    async fn execute(&self, options: Value, _ctx: TaskContext) -> Result<TaskOutput, AppError> {
        let label = options["label"].as_str().unwrap_or(self.kind).to_string();
        self.journal.lock().unwrap().push(label);
        let mut output = TaskOutput::default();
        if let Some(kind) = self.follow_up {
            output.tasks.add(kind, json!({ "label": "follow-up" }));
        }
        Ok(output)
    }
}

struct Failing;

#[async_trait]
impl TaskExecutor for Failing {
    fn kind(&self) -> &str {
        "explode"
    }

    async fn execute(&self, _options: Value, _ctx: TaskContext) -> Result<TaskOutput, AppError> {
        Err(AppError::new(ErrorCategory::TaskError, "boom").with_code("TEST-BOOM"))
    }
}

fn registry(journal: &Journal) -> TaskExecutorRegistry {
    let registry = TaskExecutorRegistry::default();
    registry.register(Arc::new(Journaling {
        kind: "step",
        journal: journal.clone(),
        follow_up: None,
    }));
    registry.register(Arc::new(Journaling {
        kind: "chain",
        journal: journal.clone(),
        follow_up: Some("step"),
    }));
    registry.register(Arc::new(Failing));
    registry
}

fn ctx() -> TaskContext {
    TaskContext::new(Arc::new(MemoryHost::new()), None)
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

#[tokio::test]
async fn dependent_task_runs_after_its_dependency() {
    let journal = Journal::default();
    let mut batch = TaskBatch::new();
    let r1 = batch.add("step", json!({ "label": "R1" }));
    batch.add_with_dependencies("step", json!({ "label": "R2" }), [r1]);

    let mut scheduler = TaskScheduler::new();
    scheduler.schedule(batch).unwrap();
    scheduler.run(&registry(&journal), &ctx()).await.unwrap();
    assert_eq!(entries(&journal), vec!["R1", "R2"]);
}

#[tokio::test]
async fn independent_tasks_run_in_submission_order() {
    let journal = Journal::default();
    let mut batch = TaskBatch::new();
    for label in ["first", "second", "third"] {
        batch.add("step", json!({ "label": label }));
    }
    let mut scheduler = TaskScheduler::new();
    let ids = scheduler.schedule(batch).unwrap();
    assert_eq!(ids, vec![TaskId(0), TaskId(1), TaskId(2)]);

    let report = scheduler.run(&registry(&journal), &ctx()).await.unwrap();
    assert_eq!(entries(&journal), vec!["first", "second", "third"]);
    assert_eq!(report.executed.len(), 3);
}

#[tokio::test]
async fn follow_up_tasks_are_queued_and_run() {
    let journal = Journal::default();
    let mut batch = TaskBatch::new();
    batch.add("chain", json!({ "label": "parent" }));
    batch.add("step", json!({ "label": "sibling" }));

    let mut scheduler = TaskScheduler::new();
    scheduler.schedule(batch).unwrap();
    let report = scheduler.run(&registry(&journal), &ctx()).await.unwrap();

    assert_eq!(entries(&journal), vec!["parent", "sibling", "follow-up"]);
    assert_eq!(report.executed.last().unwrap().0, TaskId(2));
}

#[tokio::test]
async fn ids_keep_growing_across_batches() {
    let mut scheduler = TaskScheduler::new();
    let mut first = TaskBatch::new();
    first.add("step", Value::Null);
    let mut second = TaskBatch::new();
    second.add("step", Value::Null);

    assert_eq!(scheduler.schedule(first).unwrap(), vec![TaskId(0)]);
    assert_eq!(scheduler.schedule(second).unwrap(), vec![TaskId(1)]);
    assert_eq!(scheduler.pending(), 2);
}

#[tokio::test]
async fn unknown_kind_keeps_finished_work_and_drops_the_rest() {
    let journal = Journal::default();
    let mut batch = TaskBatch::new();
    batch.add("step", json!({ "label": "done" }));
    batch.add("teleport", json!({}));
    batch.add("step", json!({ "label": "never" }));

    let mut scheduler = TaskScheduler::new();
    scheduler.schedule(batch).unwrap();
    let err = scheduler.run(&registry(&journal), &ctx()).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::UnknownTaskKind);
    assert_eq!(err.code, "TASK-KIND-001");
    assert_eq!(entries(&journal), vec!["done"]);
    assert!(scheduler.is_idle());
}

#[tokio::test]
async fn failing_executor_aborts_the_batch() {
    let journal = Journal::default();
    let mut batch = TaskBatch::new();
    batch.add("explode", json!({}));
    batch.add("step", json!({ "label": "after" }));

    let mut scheduler = TaskScheduler::new();
    scheduler.schedule(batch).unwrap();
    let err = scheduler.run(&registry(&journal), &ctx()).await.unwrap_err();

    assert_eq!(err.code, "TEST-BOOM");
    assert_eq!(err.context.get("kind").unwrap(), "explode");
    assert_eq!(err.context.get("aborted_tasks").unwrap(), "1");
    assert!(entries(&journal).is_empty());
}

#[derive(Default)]
struct RecordingRunner {
    requests: Mutex<Vec<CommandRequest>>,
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(CommandOutput::default())
    }
}

#[tokio::test]
async fn builtin_executors_run_through_the_command_runner() {
    let runner = Arc::new(RecordingRunner::default());
    let registry = TaskExecutorRegistry::default();
    let root = PathBuf::from("/workspace/app");
    register_builtins(
        &registry,
        BuiltinExecutorDeps {
            root_directory: Some(root.clone()),
            package_manager: Some("pnpm".to_string()),
            package_registry: Some("https://registry.example.com".to_string()),
            command_runner: Some(runner.clone()),
        },
    );
    assert_eq!(
        registry.kinds(),
        vec!["lint-fix", "package-install", "repository-init", "run-transformation"]
    );

    let mut batch = TaskBatch::new();
    let install = batch.add(PACKAGE_INSTALL, Value::Null);
    batch.add_with_dependencies(
        RUN_TRANSFORMATION,
        json!({ "collection": "app", "name": "readme" }),
        [install],
    );
    let mut scheduler = TaskScheduler::new();
    scheduler.schedule(batch).unwrap();
    let report = scheduler.run(&registry, &ctx()).await.unwrap();

    let requests = runner.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].display(),
        "pnpm install --silent --registry=https://registry.example.com"
    );
    assert_eq!(requests[0].cwd, root);
    assert_eq!(report.transformations.len(), 1);
    assert_eq!(report.transformations[0].to_string(), "app:readme");
}

#[tokio::test]
async fn repository_init_without_a_root_is_a_task_error() {
    let registry = TaskExecutorRegistry::default();
    register_builtins(
        &registry,
        BuiltinExecutorDeps {
            command_runner: Some(Arc::new(RecordingRunner::default())),
            ..BuiltinExecutorDeps::default()
        },
    );
    let mut batch = TaskBatch::new();
    batch.add(REPOSITORY_INIT, Value::Null);
    let mut scheduler = TaskScheduler::new();
    scheduler.schedule(batch).unwrap();

    let err = scheduler.run(&registry, &ctx()).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::TaskError);
    assert_eq!(err.code, "TASK-CFG-001");
}
