use async_trait::async_trait;
use serde_json::json;

use super::types::{Tool, ToolOutcome};
use crate::error::AppError;
use crate::pipeline::RunContext;
use crate::result::{DetectionResult, Record};
use crate::task::DetectionTask;

pub const MOCK_SCORE: f64 = 0.82;

#[derive(Clone, Debug, Default)]
pub struct MockAnomalyDetectionTool;

impl MockAnomalyDetectionTool {
    pub const NAME: &'static str = "mock_anomaly_detection";

    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, task: &DetectionTask) -> DetectionResult {
        let mut anomaly = Record::new();
        anomaly.insert("timestamp".to_string(), json!(task.start_time));
        anomaly.insert("score".to_string(), json!(MOCK_SCORE));
        anomaly.insert("type".to_string(), json!("spike"));
        DetectionResult::success(&task.task_id, vec![anomaly])
            .with_metadata("mock", json!(true))
            .with_metadata("tool", json!(Self::NAME))
    }
}

#[async_trait]
impl Tool for MockAnomalyDetectionTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, task: &DetectionTask, _ctx: &RunContext) -> Result<ToolOutcome, AppError> {
        Ok(ToolOutcome::success(Self::NAME, self.detect(task)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> DetectionTask {
        DetectionTask::new("t1", "a1", "2025-01-01T00:00:00Z", "2025-01-01T01:00:00Z")
    }

    #[tokio::test]
    async fn returns_one_canned_anomaly() {
        let ctx = RunContext::new("trace");
        let outcome = MockAnomalyDetectionTool::new().run(&task(), &ctx).await.unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.task_id, "t1");
        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0]["timestamp"], json!("2025-01-01T00:00:00Z"));
        assert_eq!(result.anomalies[0]["score"], json!(MOCK_SCORE));
        assert_eq!(result.metadata["mock"], json!(true));
    }

    #[tokio::test]
    async fn repeated_runs_are_byte_identical() {
        let tool = MockAnomalyDetectionTool::new();
        let ctx = RunContext::new("trace");
        let first = tool.run(&task(), &ctx).await.unwrap();
        let second = tool.run(&task(), &ctx).await.unwrap();
        assert_eq!(
            serde_json::to_vec(&first.result().unwrap().anomalies).unwrap(),
            serde_json::to_vec(&second.result().unwrap().anomalies).unwrap()
        );
    }
}
