use async_trait::async_trait;
use serde::Serialize;

use crate::error::AppError;
use crate::pipeline::RunContext;
use crate::result::DetectionResult;
use crate::task::DetectionTask;

/// Outcome of one tool invocation. Exactly one of `result` and `error` is
/// populated; the constructors are the only way to build one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolOutcome {
    tool_name: String,
    success: bool,
    result: Option<DetectionResult>,
    error: Option<String>,
}

impl ToolOutcome {
    pub fn success(tool_name: &str, result: DetectionResult) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(tool_name: &str, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn result(&self) -> Option<&DetectionResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn into_result(self) -> Result<DetectionResult, String> {
        match (self.result, self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(error),
            (None, None) => Err("unknown tool error".to_string()),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, task: &DetectionTask, ctx: &RunContext) -> Result<ToolOutcome, AppError>;
}
