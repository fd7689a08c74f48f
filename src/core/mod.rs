pub mod config;
pub mod engine;
pub mod engine_host;
pub mod error;
pub mod host;
pub mod tasks;
pub mod tree;
pub mod types;
pub mod workflow;

pub use config::{ConfigLoader, WorkflowOptions};
pub use engine::{Engine, Transformation, TransformationContext, TransformationInvocation};
pub use engine_host::{EngineHost, ValidatedOptions};
pub use error::{AppError, DefaultErrorReporter, ErrorReporter};
pub use host::{Host, HostError, LocalHost, MemoryHost, NormalizedPath, ScopedHost};
pub use tasks::{TaskExecutor, TaskId, TaskScheduler};
pub use tree::{MergeStrategy, StagingTree};
pub use types::*;
pub use workflow::{Workflow, WorkflowEvent, WorkflowSummary};
