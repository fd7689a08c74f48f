use crate::core::engine_host::ValidatedOptions;
use crate::core::error::AppError;
use crate::core::tasks::{TaskBatch, TaskId};
use crate::core::tree::StagingTree;
use async_trait::async_trait;
use serde_json::Value;

/// Logic behind one named transformation.
///
/// Implementations stage file changes through [`TransformationContext::tree_mut`]
/// and request follow-up work with [`TransformationContext::add_task`]. They
/// must not touch a host directly; the same options over the same host state
/// must stage the same actions.
#[async_trait]
pub trait Transformation: Send + Sync + 'static {
    async fn apply(
        &self,
        options: &ValidatedOptions,
        ctx: &mut TransformationContext,
    ) -> Result<(), AppError>;
}

/// State handed to a running transformation.
pub struct TransformationContext {
    tree: StagingTree,
    tasks: TaskBatch,
    collection: String,
    name: String,
    debug: bool,
}

impl TransformationContext {
    pub(crate) fn new(tree: StagingTree, collection: String, name: String, debug: bool) -> Self {
        Self {
            tree,
            tasks: TaskBatch::new(),
            collection,
            name,
            debug,
        }
    }

    pub fn tree(&self) -> &StagingTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut StagingTree {
        &mut self.tree
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn add_task(&mut self, kind: impl Into<String>, options: Value) -> TaskId {
        self.tasks.add(kind, options)
    }

    pub fn add_task_with_dependencies(
        &mut self,
        kind: impl Into<String>,
        options: Value,
        dependencies: impl IntoIterator<Item = TaskId>,
    ) -> TaskId {
        self.tasks.add_with_dependencies(kind, options, dependencies)
    }

    pub(crate) fn into_parts(self) -> (StagingTree, TaskBatch) {
        (self.tree, self.tasks)
    }
}
