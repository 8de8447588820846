use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::result::DetectionResult;
use crate::task::DetectionTask;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub step: String,
    pub code: String,
    pub message: String,
}

impl StepError {
    pub fn new(step: &str, code: &str, message: &str) -> Self {
        Self {
            step: step.to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn from_app_error(step: &str, err: &AppError) -> Self {
        Self::new(step, err.code(), err.message())
    }
}

#[derive(Clone, Debug, Default)]
pub struct StateUpdate {
    pub context: Map<String, Value>,
    pub logs: Vec<String>,
    pub errors: Vec<StepError>,
    pub result: Option<DetectionResult>,
    pub summary: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    pub fn error(mut self, error: StepError) -> Self {
        self.errors.push(error);
        self
    }

    pub fn result(mut self, result: DetectionResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    task: DetectionTask,
    context: Map<String, Value>,
    logs: Vec<String>,
    errors: Vec<StepError>,
    result: Option<DetectionResult>,
    step_count: usize,
    completed_steps: Vec<String>,
}

impl ExecutionState {
    pub fn new(task: DetectionTask) -> Self {
        Self {
            task,
            context: Map::new(),
            logs: Vec::new(),
            errors: Vec::new(),
            result: None,
            step_count: 0,
            completed_steps: Vec::new(),
        }
    }

    pub fn task(&self) -> &DetectionTask {
        &self.task
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn errors(&self) -> &[StepError] {
        &self.errors
    }

    pub fn result(&self) -> Option<&DetectionResult> {
        self.result.as_ref()
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    pub fn has_completed(&self, step: &str) -> bool {
        self.completed_steps.iter().any(|name| name == step)
    }

    pub(crate) fn enter_step(&mut self) -> usize {
        self.step_count += 1;
        self.step_count
    }

    pub(crate) fn mark_completed(&mut self, step: &str) {
        if !self.has_completed(step) {
            self.completed_steps.push(step.to_string());
        }
    }

    pub fn apply(&mut self, update: StateUpdate) -> Result<(), AppError> {
        if update.result.is_some() && self.result.is_some() {
            return Err(AppError::app("detection result is already set"));
        }
        if update.summary.is_some() && self.result.is_none() && update.result.is_none() {
            return Err(AppError::app("summary produced without a detection result"));
        }

        self.context.extend(update.context);
        self.logs.extend(update.logs);
        self.errors.extend(update.errors);
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        if let (Some(summary), Some(result)) = (update.summary, self.result.as_mut()) {
            result.summary = Some(summary);
        }
        Ok(())
    }

    /// Final result for the caller. A run without a result renders as a
    /// failed result carrying the accumulated errors and logs.
    pub fn into_result(self) -> DetectionResult {
        match self.result {
            Some(result) => result,
            None => DetectionResult::failed(&self.task.task_id)
                .with_metadata("errors", json!(self.errors))
                .with_metadata("logs", json!(self.logs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::DetectionStatus;

    fn state() -> ExecutionState {
        ExecutionState::new(DetectionTask::new("t1", "a1", "s", "e"))
    }

    #[test]
    fn updates_append_and_merge() {
        let mut state = state();
        state
            .apply(StateUpdate::new().context("loaded", json!(true)).log("Data loaded"))
            .unwrap();
        state
            .apply(
                StateUpdate::new()
                    .context("tool", json!("mock"))
                    .error(StepError::new("detect_anomalies", "external_service", "down")),
            )
            .unwrap();
        assert_eq!(state.context().len(), 2);
        assert_eq!(state.logs(), &["Data loaded".to_string()]);
        assert_eq!(state.errors().len(), 1);
    }

    #[test]
    fn result_is_set_once() {
        let mut state = state();
        state
            .apply(StateUpdate::new().result(DetectionResult::success("t1", vec![])))
            .unwrap();
        let err = state
            .apply(StateUpdate::new().result(DetectionResult::failed("t1")))
            .unwrap_err();
        assert_eq!(err.code(), "app_error");
        assert_eq!(state.result().map(|r| r.status), Some(DetectionStatus::Success));
    }

    #[test]
    fn summary_requires_a_result() {
        let mut state = state();
        assert!(state.apply(StateUpdate::new().summary("nothing")).is_err());
        state
            .apply(StateUpdate::new().result(DetectionResult::success("t1", vec![])))
            .unwrap();
        state.apply(StateUpdate::new().summary("all quiet")).unwrap();
        assert_eq!(state.result().and_then(|r| r.summary.as_deref()), Some("all quiet"));
    }

    #[test]
    fn missing_result_renders_failed_with_errors() {
        let mut state = state();
        state
            .apply(StateUpdate::new().error(StepError::new("detect_anomalies", "tool_error", "boom")))
            .unwrap();
        let result = state.into_result();
        assert_eq!(result.task_id, "t1");
        assert_eq!(result.status, DetectionStatus::Failed);
        assert!(result.anomalies.is_empty());
        assert_eq!(result.metadata["errors"][0]["message"], json!("boom"));
    }

    #[test]
    fn completed_steps_are_not_duplicated() {
        let mut state = state();
        state.mark_completed("load_data");
        state.mark_completed("load_data");
        assert_eq!(state.completed_steps().len(), 1);
        assert_eq!(state.enter_step(), 1);
        assert_eq!(state.enter_step(), 2);
    }
}
