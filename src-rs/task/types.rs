use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionTask {
    pub task_id: String,
    pub asset_id: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl DetectionTask {
    pub fn new(task_id: &str, asset_id: &str, start_time: &str, end_time: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            asset_id: asset_id.to_string(),
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            data_source: None,
            parameters: Map::new(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [("task_id", &self.task_id), ("asset_id", &self.asset_id)] {
            if value.trim().is_empty() {
                return Err(AppError::data_missing(format!("{} must not be empty", field))
                    .with_detail("field", field));
            }
        }
        Ok(())
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    pub fn threshold(&self) -> f64 {
        match self.parameter("threshold") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(DEFAULT_THRESHOLD),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_THRESHOLD),
            _ => DEFAULT_THRESHOLD,
        }
    }

    pub fn data(&self) -> Vec<Value> {
        self.parameter("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    pub fn tool_type(&self) -> Option<&str> {
        self.parameter("tool_type")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
