use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStatus {
    Success,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub task_id: String,
    pub status: DetectionStatus,
    #[serde(default)]
    pub anomalies: Vec<Record>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub metadata: Record,
}

impl DetectionResult {
    pub fn success(task_id: &str, anomalies: Vec<Record>) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: DetectionStatus::Success,
            anomalies,
            summary: None,
            metadata: Record::new(),
        }
    }

    pub fn failed(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: DetectionStatus::Failed,
            anomalies: Vec::new(),
            summary: None,
            metadata: Record::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn max_score(&self) -> Option<f64> {
        self.anomalies
            .iter()
            .filter_map(|record| record.get("score").and_then(Value::as_f64))
            .fold(None, |acc, score| match acc {
                Some(best) if best >= score => Some(best),
                _ => Some(score),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_lowercase() {
        let result = DetectionResult::failed("t1");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], json!("failed"));
        assert_eq!(value["anomalies"], json!([]));
        assert_eq!(value["summary"], Value::Null);
    }

    #[test]
    fn missing_optional_fields_default() {
        let result: DetectionResult =
            serde_json::from_value(json!({"task_id": "t1", "status": "success"})).unwrap();
        assert!(result.anomalies.is_empty());
        assert!(result.metadata.is_empty());
        assert_eq!(result.status, DetectionStatus::Success);
    }

    #[test]
    fn max_score_skips_records_without_score() {
        let anomalies = vec![
            json!({"score": 0.4}).as_object().cloned().unwrap(),
            json!({"type": "drift"}).as_object().cloned().unwrap(),
            json!({"score": 0.9}).as_object().cloned().unwrap(),
        ];
        let result = DetectionResult::success("t1", anomalies);
        assert_eq!(result.max_score(), Some(0.9));
        assert_eq!(DetectionResult::failed("t1").max_score(), None);
    }
}
