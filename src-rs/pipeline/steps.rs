use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::context::RunContext;
use super::engine::Step;
use super::state::{ExecutionState, StateUpdate, StepError};
use crate::error::{AppError, ErrorKind};
use crate::llm::Summarizer;
use crate::tools::ToolSelector;

pub const LOAD_DATA: &str = "load_data";
pub const DETECT_ANOMALIES: &str = "detect_anomalies";
pub const SUMMARIZE: &str = "summarize";

#[derive(Clone, Debug, Default)]
pub struct RecoveryPolicy {
    recoverable: Vec<ErrorKind>,
}

impl RecoveryPolicy {
    pub fn fatal() -> Self {
        Self::default()
    }

    pub fn recover(kinds: &[ErrorKind]) -> Self {
        Self {
            recoverable: kinds.to_vec(),
        }
    }

    pub fn detection() -> Self {
        Self::recover(&[ErrorKind::ExternalService, ErrorKind::Tool, ErrorKind::ResponseParse])
    }

    pub fn allows(&self, err: &AppError) -> bool {
        self.recoverable.iter().any(|kind| err.is(*kind))
    }
}

pub struct LoadDataStep;

#[async_trait]
impl Step for LoadDataStep {
    fn name(&self) -> &str {
        LOAD_DATA
    }

    async fn run(&self, state: &ExecutionState, _ctx: &RunContext) -> Result<StateUpdate, AppError> {
        state.task().validate()?;
        Ok(StateUpdate::new().context("loaded", json!(true)).log("Data loaded"))
    }
}

pub struct DetectAnomaliesStep {
    selector: Arc<ToolSelector>,
    recovery: RecoveryPolicy,
}

impl DetectAnomaliesStep {
    pub fn new(selector: Arc<ToolSelector>) -> Self {
        Self {
            selector,
            recovery: RecoveryPolicy::detection(),
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    fn absorb(&self, update: StateUpdate, err: AppError) -> Result<StateUpdate, AppError> {
        if !self.recovery.allows(&err) {
            return Err(err);
        }
        warn!(code = err.code(), error = %err.describe(), "anomaly detection failed");
        Ok(update
            .error(StepError::from_app_error(DETECT_ANOMALIES, &err))
            .log("Anomaly detection failed"))
    }
}

#[async_trait]
impl Step for DetectAnomaliesStep {
    fn name(&self) -> &str {
        DETECT_ANOMALIES
    }

    async fn run(&self, state: &ExecutionState, ctx: &RunContext) -> Result<StateUpdate, AppError> {
        let task = state.task();
        let selection = match self.selector.select(task) {
            Ok(selection) => selection,
            Err(err) => return self.absorb(StateUpdate::new(), err),
        };
        let tool_name = selection.tool.name().to_string();
        let mut update = StateUpdate::new()
            .context("tool", json!(tool_name))
            .context("tool_requested", json!(selection.requested));
        if let Some(reason) = selection.fallback_reason {
            update = update.context("tool_fallback_reason", json!(reason));
        }

        let outcome = match selection.tool.run(task, ctx).await {
            Ok(outcome) => outcome,
            Err(err) => return self.absorb(update, err),
        };
        match outcome.into_result() {
            Ok(mut result) => {
                result.task_id = task.task_id.clone();
                info!(tool = %tool_name, anomalies = result.anomalies.len(), "anomaly detection completed");
                Ok(update
                    .result(result)
                    .log(format!("Anomaly detection completed using {}", tool_name)))
            }
            Err(reason) => {
                warn!(tool = %tool_name, reason = %reason, "tool reported failure");
                Ok(update
                    .error(StepError::new(DETECT_ANOMALIES, ErrorKind::Tool.code(), &reason))
                    .log("Anomaly detection failed"))
            }
        }
    }
}

pub struct SummarizeStep {
    summarizer: Arc<dyn Summarizer>,
    recovery: RecoveryPolicy,
}

impl SummarizeStep {
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            summarizer,
            recovery: RecoveryPolicy::fatal(),
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }
}

#[async_trait]
impl Step for SummarizeStep {
    fn name(&self) -> &str {
        SUMMARIZE
    }

    async fn run(&self, state: &ExecutionState, ctx: &RunContext) -> Result<StateUpdate, AppError> {
        let result = match state.result() {
            Some(result) => result,
            None => return Ok(StateUpdate::new().log("No result to summarize")),
        };
        match self.summarizer.summarize(state.task(), result, ctx).await {
            Ok(summary) => Ok(StateUpdate::new()
                .summary(summary)
                .context("summarizer", json!(self.summarizer.name()))
                .log("Summary generated")),
            Err(err) if self.recovery.allows(&err) => {
                warn!(code = err.code(), error = %err, "summary generation failed");
                Ok(StateUpdate::new()
                    .error(StepError::from_app_error(SUMMARIZE, &err))
                    .log("Summary generation failed"))
            }
            Err(err) => Err(err),
        }
    }
}
