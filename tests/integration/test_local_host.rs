use async_trait::async_trait;
use reshape::core::config::WorkflowOptions;
use reshape::core::engine::{Transformation, TransformationContext, TransformationInvocation};
use reshape::core::engine_host::{CollectionManifest, TransformationManifest, ValidatedOptions};
use reshape::core::error::AppError;
use reshape::core::host::{Host, LocalHost, NormalizedPath, ScopedHost};
use reshape::core::tasks::{CommandOutput, CommandRequest, CommandRunner};
use reshape::core::types::ErrorCategory;
use reshape::core::workflow::{HostSource, Workflow, WorkflowDeps};
use serde_json::{json, Value};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn p(raw: &str) -> NormalizedPath {
    NormalizedPath::parse(raw).unwrap()
}

#[tokio::test]
async fn local_host_reads_writes_and_lists() {
    let dir = TempDir::new().unwrap();
    let host = LocalHost::new(dir.path());

    host.write(&p("/nested/deep/file.txt"), b"hi").await.unwrap();
    host.write(&p("/top.txt"), b"top").await.unwrap();
    assert_eq!(fs::read(dir.path().join("nested/deep/file.txt")).unwrap(), b"hi");
    assert!(host.is_directory(&p("/nested")).await.unwrap());
    assert!(!host.is_directory(&p("/top.txt")).await.unwrap());
    assert_eq!(
        host.list(&p("/")).await.unwrap(),
        vec![p("/nested"), p("/top.txt")]
    );

    host.rename(&p("/top.txt"), &p("/moved/top.txt")).await.unwrap();
    assert!(!host.exists(&p("/top.txt")).await.unwrap());
    assert_eq!(host.read(&p("/moved/top.txt")).await.unwrap(), b"top");

    host.delete(&p("/nested")).await.unwrap();
    assert!(!dir.path().join("nested").exists());
}

#[tokio::test]
async fn local_host_missing_files_surface_as_not_found() {
    let dir = TempDir::new().unwrap();
    let host = LocalHost::new(dir.path());

    let err: AppError = host.read(&p("/missing.txt")).await.unwrap_err().into();
    assert_eq!(err.category, ErrorCategory::NotFound);
    assert_eq!(err.code, "HOST-NOTFOUND-001");
    assert_eq!(err.paths, vec!["/missing.txt".to_string()]);
    assert!(host.delete(&p("/missing.txt")).await.is_err());
    assert!(host.list(&p("/nowhere")).await.unwrap().is_empty());
}

#[tokio::test]
async fn scoped_host_over_a_real_directory() {
    let dir = TempDir::new().unwrap();
    let local: Arc<dyn Host> = Arc::new(LocalHost::new(dir.path()));
    let scoped = ScopedHost::new(local, p("/packages/web"));

    scoped.write(&p("/index.ts"), b"export {}").await.unwrap();
    assert!(dir.path().join("packages/web/index.ts").is_file());
    assert_eq!(scoped.list(&p("/")).await.unwrap(), vec![p("/index.ts")]);
}

struct Scaffold;

#[async_trait]
impl Transformation for Scaffold {
    async fn apply(
        &self,
        options: &ValidatedOptions,
        ctx: &mut TransformationContext,
    ) -> Result<(), AppError> {
        ctx.tree_mut().create(p("/package.json"), r#"{"name":"demo"}"#)?;
        ctx.tree_mut().create(p("/src/index.ts"), "export {};\n")?;
        if ctx.tree().exists(&p("/stale.txt")).await? {
            ctx.tree_mut().delete(&p("/stale.txt")).await?;
        }
        let install = ctx.add_task("package-install", Value::Null);
        if options.get_bool("git").unwrap_or(false) {
            ctx.add_task_with_dependencies(
                "repository-init",
                json!({ "commit": true, "message": "scaffold" }),
                [install],
            );
        }
        Ok(())
    }
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

fn scaffold_workflow(dir: &TempDir, runner: Arc<RecordingRunner>) -> Workflow {
    let workflow = Workflow::new_with_deps(
        HostSource::Root(dir.path().to_path_buf()),
        WorkflowOptions::default().with_package_manager("yarn"),
        WorkflowDeps {
            command_runner: Some(runner),
        },
    );
    workflow
        .engine_host()
        .register_collection(
            CollectionManifest::new("starter")
                .with_transformation("app", TransformationManifest::new("scaffold an app")),
        )
        .unwrap();
    workflow.engine_host().register_factory("starter:app", Scaffold);
    workflow
}

#[tokio::test]
async fn workflow_commits_to_disk_then_runs_tasks_in_the_root() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("stale.txt"), "old").unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let workflow = scaffold_workflow(&dir, runner.clone());
    assert_eq!(workflow.root(), Some(dir.path()));

    let summary = workflow
        .run(TransformationInvocation::new("starter", "app", json!({ "git": true })))
        .await
        .unwrap();

    assert_eq!(summary.applied, 3);
    assert!(dir.path().join("src/index.ts").is_file());
    assert!(!dir.path().join("stale.txt").exists());

    let commands: Vec<String> = runner
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(CommandRequest::display)
        .collect();
    assert_eq!(
        commands,
        vec![
            "yarn install --silent",
            "git init",
            "git add .",
            "git commit -m scaffold",
        ]
    );
    assert!(runner
        .requests
        .lock()
        .unwrap()
        .iter()
        .all(|request| request.cwd == dir.path()));
}

#[tokio::test]
async fn dry_run_against_disk_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let workflow = Workflow::new_with_deps(
        HostSource::Root(dir.path().to_path_buf()),
        WorkflowOptions::default().with_dry_run(true),
        WorkflowDeps {
            command_runner: Some(runner.clone()),
        },
    );
    workflow
        .engine_host()
        .register_collection(
            CollectionManifest::new("starter")
                .with_transformation("app", TransformationManifest::new("scaffold an app")),
        )
        .unwrap();
    workflow.engine_host().register_factory("starter:app", Scaffold);

    let summary = workflow
        .run(TransformationInvocation::new("starter", "app", Value::Null))
        .await
        .unwrap();
    assert!(summary.dry_run);
    assert_eq!(summary.actions.len(), 2);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    assert!(runner.requests.lock().unwrap().is_empty());
}
