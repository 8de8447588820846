use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug)]
pub struct CLIConfig {
    pub base_url: String,
    pub asset_id: String,
    pub start_time: String,
    pub end_time: String,
    pub data_source: Option<String>,
    pub tool_type: Option<String>,
    pub parameters: Map<String, Value>,
    /// Sent as `X-Trace-Id` when set; otherwise the server generates one.
    pub trace_id: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct DetectRequest {
    pub task_id: String,
    pub asset_id: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct DetectResponse {
    pub task_id: String,
    pub status: String,
    #[serde(default)]
    pub anomalies: Vec<Value>,
    pub summary: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

/// A reply plus the trace id the server echoed.
#[derive(Debug)]
pub struct Traced<T> {
    pub body: T,
    pub trace_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub task_id: String,
    pub outcome: String,
    pub trace_id: Option<String>,
}
