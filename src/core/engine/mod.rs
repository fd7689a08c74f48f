#![allow(clippy::result_large_err)]

//! Runs a resolved transformation against a read-only view of a host.

pub mod context;

pub use context::{Transformation, TransformationContext};

use crate::core::engine_host::{
    CollectionDescription, EngineHost, TransformationDescription, ValidatedOptions,
};
use crate::core::error::AppError;
use crate::core::host::{Host, ReadOnlyHost};
use crate::core::tasks::TaskBatch;
use crate::core::tree::StagingTree;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

/// A request to run `collection:name` with raw, not yet validated options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationInvocation {
    pub collection: String,
    pub name: String,
    #[serde(default)]
    pub options: Value,
}

impl TransformationInvocation {
    pub fn new(collection: impl Into<String>, name: impl Into<String>, options: Value) -> Self {
        Self {
            collection: collection.into(),
            name: name.into(),
            options,
        }
    }
}

impl fmt::Display for TransformationInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.name)
    }
}

/// Everything a transformation run produced. Nothing here has touched a host.
#[derive(Debug)]
pub struct EngineOutput {
    pub tree: StagingTree,
    pub tasks: TaskBatch,
}

#[derive(Clone)]
pub struct Engine {
    host: Arc<EngineHost>,
}

impl Engine {
    pub fn new(host: Arc<EngineHost>) -> Self {
        Self { host }
    }

    pub fn engine_host(&self) -> &Arc<EngineHost> {
        &self.host
    }

    pub fn create_collection(&self, name: &str) -> Result<Arc<CollectionDescription>, AppError> {
        self.host.resolve(name)
    }

    pub fn create_transformation(
        &self,
        collection: &str,
        name: &str,
    ) -> Result<Arc<TransformationDescription>, AppError> {
        let collection = self.create_collection(collection)?;
        self.host.create_transformation(&collection, name)
    }

    pub fn list_transformations(&self, collection: &str) -> Result<Vec<String>, AppError> {
        self.host.list_transformations(collection)
    }

    pub fn list_collections(&self) -> Vec<String> {
        self.host.list_collections()
    }

    /// Resolve and validate an invocation. Fails before anything is staged.
    pub fn resolve_invocation(
        &self,
        invocation: &TransformationInvocation,
    ) -> Result<(Arc<TransformationDescription>, ValidatedOptions), AppError> {
        let description = self.create_transformation(&invocation.collection, &invocation.name)?;
        let options = self
            .host
            .create_options_object(&description, invocation.options.clone())?;
        Ok((description, options))
    }

    /// Run `description` over a fresh staging tree whose reads fall through
    /// to `host`. The tree only sees `host` through a read-only view.
    pub async fn execute(
        &self,
        description: &TransformationDescription,
        options: &ValidatedOptions,
        host: Arc<dyn Host>,
        debug: bool,
    ) -> Result<EngineOutput, AppError> {
        let span = tracing::info_span!(
            "transformation",
            collection = %description.collection.name,
            name = %description.name
        );
        async {
            let mut ctx = TransformationContext::new(
                StagingTree::new(Arc::new(ReadOnlyHost::new(host))),
                description.collection.name.clone(),
                description.name.clone(),
                debug,
            );
            description.factory().apply(options, &mut ctx).await?;
            let (tree, tasks) = ctx.into_parts();
            tracing::debug!(actions = tree.len(), tasks = tasks.len(), "transformation staged");
            Ok(EngineOutput { tree, tasks })
        }
        .instrument(span)
        .await
    }
}
