//! Transformation workflow engine: transformations stage file changes in a
//! virtual tree, the workflow commits them to a host, and post-commit tasks
//! run afterwards.

pub mod core;
pub mod logging;

pub use crate::core::{
    AppError, Engine, EngineHost, Host, LocalHost, MemoryHost, NormalizedPath, StagingTree,
    Transformation, TransformationContext, TransformationInvocation, Workflow, WorkflowEvent,
    WorkflowOptions, WorkflowSummary,
};

/// Current crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub type Result<T> = std::result::Result<T, anyhow::Error>;
