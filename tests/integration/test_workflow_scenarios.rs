use async_trait::async_trait;
use futures::StreamExt;
use reshape::core::config::WorkflowOptions;
use reshape::core::engine::{Transformation, TransformationContext, TransformationInvocation};
use reshape::core::engine_host::{CollectionManifest, TransformationManifest, ValidatedOptions};
use reshape::core::error::AppError;
use reshape::core::host::{Host, MemoryHost, NormalizedPath};
use reshape::core::tree::ReportKind;
use reshape::core::types::ErrorCategory;
use reshape::core::workflow::{InvocationStage, Workflow, WorkflowEvent};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

fn p(raw: &str) -> NormalizedPath {
    NormalizedPath::parse(raw).unwrap()
}

/// Creates `/src/app.ts` with the configured content.
struct CreateApp;

#[async_trait]
impl Transformation for CreateApp {
    async fn apply(
        &self,
        options: &ValidatedOptions,
        ctx: &mut TransformationContext,
    ) -> Result<(), AppError> {
        let content = options.get_str("content").unwrap_or("A").to_string();
        ctx.tree_mut().create(p("/src/app.ts"), content)?;
        if let Some(kind) = options.get_str("task") {
            ctx.add_task(kind, Value::Null);
        }
        Ok(())
    }
}

/// Writes `/nodes/<id>` and queues its children through `run-transformation`.
/// A child fails unless its parent's file is already on the host.
struct Node {
    children: HashMap<&'static str, Vec<&'static str>>,
    journal: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Transformation for Node {
    async fn apply(
        &self,
        options: &ValidatedOptions,
        ctx: &mut TransformationContext,
    ) -> Result<(), AppError> {
        let id = options.get_str("id").unwrap_or("root").to_string();
        if let Some(parent) = options.get_str("parent") {
            ctx.tree().read(&p(&format!("/nodes/{}", parent))).await?;
        }
        self.journal.lock().unwrap().push(id.clone());
        ctx.tree_mut()
            .create(p(&format!("/nodes/{}", id)), id.as_str())?;
        for child in self.children.get(id.as_str()).into_iter().flatten() {
            ctx.add_task(
                "run-transformation",
                json!({
                    "collection": "demo",
                    "name": "node",
                    "options": { "id": child, "parent": id },
                }),
            );
        }
        Ok(())
    }
}

struct DoubleCreate;

#[async_trait]
impl Transformation for DoubleCreate {
    async fn apply(
        &self,
        _options: &ValidatedOptions,
        ctx: &mut TransformationContext,
    ) -> Result<(), AppError> {
        ctx.tree_mut().create(p("/first"), "1")?;
        ctx.tree_mut().create(p("/twice"), "a")?;
        ctx.tree_mut().create(p("/twice"), "b")?;
        Ok(())
    }
}

/// Yields to the runtime between reads before staging `/slow.txt`.
struct Slow;

#[async_trait]
impl Transformation for Slow {
    async fn apply(
        &self,
        _options: &ValidatedOptions,
        ctx: &mut TransformationContext,
    ) -> Result<(), AppError> {
        for _ in 0..3 {
            tokio::task::yield_now().await;
            ctx.tree().exists(&p("/src/app.ts")).await?;
        }
        ctx.tree_mut().create(p("/slow.txt"), "slow")?;
        Ok(())
    }
}

/// Tries to write straight to the host behind the staging tree.
struct WriteBase;

#[async_trait]
impl Transformation for WriteBase {
    async fn apply(
        &self,
        _options: &ValidatedOptions,
        ctx: &mut TransformationContext,
    ) -> Result<(), AppError> {
        ctx.tree().base().write(&p("/leak"), b"x").await?;
        Ok(())
    }
}

fn workflow(
    host: Arc<MemoryHost>,
    options: WorkflowOptions,
) -> (Workflow, Arc<Mutex<Vec<String>>>) {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let workflow = Workflow::with_host(host, None, options);
    let engine_host = workflow.engine_host();
    engine_host
        .register_collection(
            CollectionManifest::new("demo")
                .with_transformation("app", TransformationManifest::new("create the app entry"))
                .with_transformation("node", TransformationManifest::new("tree of nested runs"))
                .with_transformation("broken", TransformationManifest::new("stages twice"))
                .with_transformation("slow", TransformationManifest::new("yields while staging"))
                .with_transformation("write-base", TransformationManifest::new("writes the host")),
        )
        .unwrap();
    engine_host.register_factory("demo:app", CreateApp);
    engine_host.register_factory(
        "demo:node",
        Node {
            children: HashMap::from([("a", vec!["b", "c"]), ("b", vec!["d"])]),
            journal: journal.clone(),
        },
    );
    engine_host.register_factory("demo:broken", DoubleCreate);
    engine_host.register_factory("demo:slow", Slow);
    engine_host.register_factory("demo:write-base", WriteBase);
    (workflow, journal)
}

fn app(options: Value) -> TransformationInvocation {
    TransformationInvocation::new("demo", "app", options)
}

async fn collect(
    workflow: &Workflow,
    invocation: TransformationInvocation,
) -> Vec<Result<WorkflowEvent, AppError>> {
    workflow.execute(invocation).collect().await
}

fn event_name(event: &Result<WorkflowEvent, AppError>) -> String {
    match event {
        Ok(WorkflowEvent::WorkflowStart { .. }) => "start".to_string(),
        Ok(WorkflowEvent::Stage { stage, .. }) => stage.to_string(),
        Ok(WorkflowEvent::Action { .. }) => "action".to_string(),
        Ok(WorkflowEvent::Conflict { .. }) => "conflict".to_string(),
        Ok(WorkflowEvent::Committed { .. }) => "commit".to_string(),
        Ok(WorkflowEvent::TasksScheduled { .. }) => "schedule".to_string(),
        Ok(WorkflowEvent::TaskCompleted { .. }) => "task".to_string(),
        Ok(WorkflowEvent::WorkflowEnd { .. }) => "end".to_string(),
        Err(err) => format!("error {}", err.code),
    }
}

fn stages(events: &[Result<WorkflowEvent, AppError>]) -> Vec<InvocationStage> {
    events
        .iter()
        .filter_map(|event| match event {
            Ok(WorkflowEvent::Stage { stage, .. }) => Some(*stage),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn create_then_rerun_needs_force_and_stays_idempotent() {
    let host = Arc::new(MemoryHost::new());
    let (first, _) = workflow(host.clone(), WorkflowOptions::default());
    let summary = assert_ok!(first.run(app(json!({ "content": "A" }))).await);
    assert_eq!(summary.applied, 1);
    assert_eq!(host.read(&p("/src/app.ts")).await.unwrap(), b"A");

    let err = assert_err!(first.run(app(json!({ "content": "A" }))).await);
    assert_eq!(err.category, ErrorCategory::ConflictError);
    assert_eq!(err.paths, vec!["/src/app.ts".to_string()]);
    assert_eq!(err.context.get("stage").unwrap(), "commit");

    let (forced, _) = workflow(host.clone(), WorkflowOptions::default().with_force(true));
    let summary = forced.run(app(json!({ "content": "A" }))).await.unwrap();
    assert_eq!(summary.applied, 0);
    assert!(summary.conflicts.is_empty());
    assert_eq!(host.read(&p("/src/app.ts")).await.unwrap(), b"A");
}

#[tokio::test]
async fn forced_run_replaces_differing_content() {
    let host = Arc::new(MemoryHost::with_files([(p("/src/app.ts"), "A")]));
    let (forced, _) = workflow(host.clone(), WorkflowOptions::default().with_force(true));
    forced.run(app(json!({ "content": "B" }))).await.unwrap();
    assert_eq!(host.read(&p("/src/app.ts")).await.unwrap(), b"B");
}

#[tokio::test]
async fn dry_run_reports_without_touching_the_host() {
    let host = Arc::new(MemoryHost::with_files([(p("/src/app.ts"), "old")]));
    let before = host.snapshot().await;
    let (workflow, _) = workflow(host.clone(), WorkflowOptions::default().with_dry_run(true));

    let events = collect(&workflow, app(json!({ "content": "new", "task": "teleport" }))).await;
    assert!(events.iter().all(Result::is_ok));
    assert_eq!(host.snapshot().await, before);
    assert_eq!(
        stages(&events),
        vec![
            InvocationStage::Pending,
            InvocationStage::Resolved,
            InvocationStage::Executed,
            InvocationStage::Discarded,
            InvocationStage::Done,
        ]
    );

    let actions: Vec<ReportKind> = events
        .iter()
        .filter_map(|event| match event {
            Ok(WorkflowEvent::Action { entry, .. }) => Some(entry.kind),
            _ => None,
        })
        .collect();
    assert_eq!(actions, vec![ReportKind::Update]);
    assert!(events.iter().any(|event| matches!(
        event,
        Ok(WorkflowEvent::Conflict { path, .. }) if path.as_str() == "/src/app.ts"
    )));
    // The unknown task kind never ran: dry runs drop their tasks.
    assert!(!events
        .iter()
        .any(|event| matches!(event, Ok(WorkflowEvent::TaskCompleted { .. }))));
}

#[tokio::test]
async fn nested_transformations_run_first_in_first_out_after_commit() {
    let host = Arc::new(MemoryHost::new());
    let (workflow, journal) = workflow(host.clone(), WorkflowOptions::default());

    let summary = workflow
        .run(TransformationInvocation::new("demo", "node", json!({ "id": "a" })))
        .await
        .unwrap();

    assert_eq!(*journal.lock().unwrap(), vec!["a", "b", "c", "d"]);
    assert_eq!(summary.invocations, 4);
    assert_eq!(summary.tasks.len(), 3);
    assert!(summary
        .tasks
        .iter()
        .all(|(_, kind)| kind == "run-transformation"));
    let files: Vec<NormalizedPath> = host.snapshot().await.into_keys().collect();
    assert_eq!(
        files,
        vec![p("/nodes/a"), p("/nodes/b"), p("/nodes/c"), p("/nodes/d")]
    );
}

#[tokio::test]
async fn unknown_task_kind_keeps_committed_files() {
    let host = Arc::new(MemoryHost::new());
    let (workflow, _) = workflow(host.clone(), WorkflowOptions::default());

    let events = collect(&workflow, app(json!({ "task": "teleport" }))).await;
    let err = events.last().unwrap().as_ref().unwrap_err();
    assert_eq!(err.category, ErrorCategory::UnknownTaskKind);
    assert_eq!(err.context.get("stage").unwrap(), "tasks");
    assert_eq!(
        stages(&events),
        vec![
            InvocationStage::Pending,
            InvocationStage::Resolved,
            InvocationStage::Executed,
            InvocationStage::Committed,
            InvocationStage::TasksScheduled,
            InvocationStage::Failed,
        ]
    );
    assert_eq!(host.read(&p("/src/app.ts")).await.unwrap(), b"A");
}

#[tokio::test]
async fn staging_errors_leave_the_host_untouched() {
    let host = Arc::new(MemoryHost::new());
    let (workflow, _) = workflow(host.clone(), WorkflowOptions::default());

    let err = workflow
        .run(TransformationInvocation::new("demo", "broken", Value::Null))
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::StagingError);
    assert_eq!(err.code, "TREE-EXISTS-001");
    assert_eq!(err.context.get("stage").unwrap(), "execute");
    assert_eq!(host.file_count().await, 0);
}

#[tokio::test]
async fn invalid_options_fail_before_staging() {
    let host = Arc::new(MemoryHost::new());
    let (workflow, _) = workflow(host.clone(), WorkflowOptions::default());

    let err = workflow.run(app(json!("not an object"))).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::ValidationError);
    assert_eq!(err.context.get("stage").unwrap(), "resolve");
    assert_eq!(host.file_count().await, 0);
}

#[tokio::test]
async fn concurrent_runs_are_serialized() {
    let host = Arc::new(MemoryHost::new());
    let (workflow, journal) = workflow(host.clone(), WorkflowOptions::default());

    let (left, right) = tokio::join!(
        workflow.run(TransformationInvocation::new("demo", "node", json!({ "id": "c" }))),
        workflow.run(TransformationInvocation::new("demo", "node", json!({ "id": "d" }))),
    );
    left.unwrap();
    right.unwrap();
    assert_eq!(journal.lock().unwrap().len(), 2);
    assert_eq!(host.file_count().await, 2);
}

#[tokio::test]
async fn concurrent_streams_do_not_interleave() {
    let host = Arc::new(MemoryHost::new());
    let (workflow, _) = workflow(host.clone(), WorkflowOptions::default());
    let order = Arc::new(Mutex::new(Vec::new()));

    let drain = |tag: &'static str, invocation: TransformationInvocation| {
        let order = order.clone();
        let stream = workflow.execute(invocation);
        async move {
            tokio::pin!(stream);
            while let Some(event) = stream.next().await {
                order
                    .lock()
                    .unwrap()
                    .push(format!("{} {}", tag, event_name(&event)));
            }
        }
    };
    tokio::join!(
        drain("slow", TransformationInvocation::new("demo", "slow", Value::Null)),
        drain("app", app(Value::Null)),
    );

    let order = order.lock().unwrap().clone();
    let position = |entry: &str| order.iter().position(|seen| seen == entry).unwrap();
    assert!(position("slow commit") < position("app pending"));
    assert!(position("slow end") < position("app start"));
    assert_eq!(order.iter().filter(|seen| seen.ends_with(" end")).count(), 2);
    assert_eq!(host.file_count().await, 2);
}

#[tokio::test]
async fn dropping_the_stream_before_commit_leaves_the_host_untouched() {
    let host = Arc::new(MemoryHost::with_files([(p("/README.md"), "readme")]));
    let before = host.snapshot().await;
    let (workflow, _) = workflow(host.clone(), WorkflowOptions::default());

    {
        let stream = workflow.execute(app(json!({ "content": "A" })));
        tokio::pin!(stream);
        let mut seen = Vec::new();
        while let Some(event) = stream.next().await {
            let name = event_name(&event);
            seen.push(name.clone());
            if name == "action" {
                break;
            }
        }
        assert_eq!(seen.last().map(String::as_str), Some("action"));
    }
    assert_eq!(host.snapshot().await, before);

    // The gate is released with the dropped stream.
    let summary = workflow.run(app(json!({ "content": "A" }))).await.unwrap();
    assert_eq!(summary.applied, 1);
}

#[tokio::test]
async fn transformations_cannot_write_the_host_directly() {
    let host = Arc::new(MemoryHost::new());
    let (workflow, _) = workflow(host.clone(), WorkflowOptions::default().with_dry_run(true));

    let err = workflow
        .run(TransformationInvocation::new("demo", "write-base", Value::Null))
        .await
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::PermissionDenied);
    assert_eq!(err.paths, vec!["/leak".to_string()]);
    assert_eq!(err.context.get("stage").unwrap(), "execute");
    assert!(host.read(&p("/leak")).await.is_err());
    assert_eq!(host.file_count().await, 0);
}

#[tokio::test]
async fn workflow_events_bracket_the_run() {
    let host = Arc::new(MemoryHost::new());
    let (workflow, _) = workflow(host, WorkflowOptions::default());
    let events = collect(&workflow, app(Value::Null)).await;

    let (start_id, end_id) = match (events.first(), events.last()) {
        (
            Some(Ok(WorkflowEvent::WorkflowStart { id: start, .. })),
            Some(Ok(WorkflowEvent::WorkflowEnd {
                id: end,
                invocations,
                ..
            })),
        ) => {
            assert_eq!(*invocations, 1);
            (*start, *end)
        }
        other => panic!("unexpected bracket events: {:?}", other),
    };
    assert_eq!(start_id, end_id);
    assert!(events.iter().any(|event| matches!(
        event,
        Ok(WorkflowEvent::Committed { applied: 1, .. })
    )));
}
