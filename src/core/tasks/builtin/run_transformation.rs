use super::RUN_TRANSFORMATION;
use crate::core::engine::TransformationInvocation;
use crate::core::error::AppError;
use crate::core::tasks::{TaskContext, TaskExecutor, TaskOutput};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde_json::Value;

/// Hands a transformation back to the workflow, which runs it after the
/// current one has committed.
pub struct RunTransformationExecutor;

#[async_trait]
impl TaskExecutor for RunTransformationExecutor {
    fn kind(&self) -> &str {
        RUN_TRANSFORMATION
    }

    async fn execute(&self, options: Value, _ctx: TaskContext) -> Result<TaskOutput, AppError> {
        let invocation: TransformationInvocation =
            serde_json::from_value(options).map_err(|err| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    format!("run-transformation needs collection and name: {}", err),
                )
                .with_code("TASK-OPTS-001")
            })?;
        tracing::debug!(invocation = %invocation, "queueing nested transformation");
        Ok(TaskOutput {
            transformations: vec![invocation],
            ..TaskOutput::default()
        })
    }
}
