use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use super::retry::RetryPolicy;
use super::types::{Tool, ToolOutcome};
use crate::config::Settings;
use crate::error::{truncate_chars, AppError, ErrorKind};
use crate::pipeline::RunContext;
use crate::result::{DetectionResult, Record};
use crate::task::DetectionTask;
use crate::trace::TRACE_ID_HEADER;

pub const RESPONSE_PREVIEW_LIMIT: usize = 200;

const FAILURE_TIMEOUT: &str = "timeout";
const FAILURE_CONNECTION: &str = "connection";
const FAILURE_STATUS: &str = "status";

#[derive(Clone, Debug)]
pub struct HttpToolConfig {
    pub service_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl HttpToolConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let service_url = settings.anomaly_detection_url.clone().ok_or_else(missing_url)?;
        Ok(Self {
            service_url,
            timeout: settings.anomaly_detection_timeout,
            retry: RetryPolicy::from_settings(settings),
        })
    }
}

pub struct HttpAnomalyDetectionTool {
    cfg: HttpToolConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    anomalies: Vec<Record>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    metadata: Record,
    #[serde(default)]
    error: Option<String>,
}

impl HttpAnomalyDetectionTool {
    pub const NAME: &'static str = "http_anomaly_detection";

    pub fn new(mut cfg: HttpToolConfig) -> Result<Self, AppError> {
        cfg.service_url = cfg.service_url.trim().trim_end_matches('/').to_string();
        if cfg.service_url.is_empty() {
            return Err(missing_url());
        }
        let client = Client::builder()
            .timeout(cfg.timeout)
            .user_agent(format!("anomaly-agent/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| {
                AppError::configuration("failed to build detection HTTP client", None).with_source(err)
            })?;
        info!(tool = Self::NAME, url = %cfg.service_url, "initialized HTTP detection tool");
        Ok(Self { cfg, client })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        Self::new(HttpToolConfig::from_settings(settings)?)
    }

    pub fn service_url(&self) -> &str {
        &self.cfg.service_url
    }

    fn payload(task: &DetectionTask) -> Value {
        json!({
            "task_id": task.task_id,
            "asset_id": task.asset_id,
            "start_time": task.start_time,
            "end_time": task.end_time,
            "data_source": task.data_source,
            "data": task.data(),
            "threshold": task.threshold(),
            "parameters": task.parameters,
        })
    }

    async fn attempt(
        &self,
        task: &DetectionTask,
        trace_id: &str,
        payload: &Value,
    ) -> Result<ToolOutcome, AppError> {
        let endpoint = format!("{}/detect", self.cfg.service_url);
        let resp = self
            .client
            .post(&endpoint)
            .header(TRACE_ID_HEADER, trace_id)
            .json(payload)
            .send()
            .await
            .map_err(|err| self.classify(task, err))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|err| self.classify(task, err))?;
        if !status.is_success() {
            error!(
                tool = Self::NAME,
                task_id = %task.task_id,
                status_code = status.as_u16(),
                body = %truncate_chars(&body, 500),
                "detection service rejected request"
            );
            return Err(AppError::external_service(format!(
                "HTTP service returned {}",
                status.as_u16()
            ))
            .with_detail("url", &self.cfg.service_url)
            .with_detail("status_code", status.as_u16())
            .with_detail("response_preview", truncate_chars(&body, RESPONSE_PREVIEW_LIMIT))
            .with_detail("failure", FAILURE_STATUS));
        }

        self.outcome_from_body(task, &body)
    }

    fn outcome_from_body(&self, task: &DetectionTask, body: &str) -> Result<ToolOutcome, AppError> {
        let remote: RemoteResponse = serde_json::from_str(body).map_err(|err| {
            AppError::response_parse("detection service returned an unreadable body", body)
                .with_detail("url", &self.cfg.service_url)
                .with_source(err)
        })?;

        match remote.status.as_deref() {
            None | Some("success") => {}
            Some("failed") => {
                let reason = remote
                    .error
                    .unwrap_or_else(|| "detection service reported failure".to_string());
                return Ok(ToolOutcome::failure(Self::NAME, reason));
            }
            Some(other) => {
                return Err(AppError::response_parse(
                    format!("unknown detection status: {}", other),
                    body,
                ))
            }
        }

        let mut result = DetectionResult::success(&task.task_id, remote.anomalies);
        result.summary = remote.summary;
        result.metadata = remote.metadata;
        result
            .metadata
            .insert("tool".to_string(), json!(Self::NAME));
        result
            .metadata
            .insert("service_url".to_string(), json!(self.cfg.service_url));
        Ok(ToolOutcome::success(Self::NAME, result))
    }

    fn classify(&self, task: &DetectionTask, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            let secs = self.cfg.timeout.as_secs_f64();
            return AppError::external_service(format!("request timeout after {}s", secs))
                .with_detail("url", &self.cfg.service_url)
                .with_detail("timeout", secs)
                .with_detail("failure", FAILURE_TIMEOUT)
                .with_source(err);
        }
        if err.is_connect() || err.is_request() || err.is_body() {
            return AppError::external_service("failed to connect to detection service")
                .with_detail("url", &self.cfg.service_url)
                .with_detail("failure", FAILURE_CONNECTION)
                .with_source(err);
        }
        AppError::tool_execution_failed(
            Self::NAME,
            Some(json!({"task_id": task.task_id, "asset_id": task.asset_id})),
            err,
        )
    }
}

/// Only transport-level failures are retried; a non-2xx reply is final.
fn is_transient(err: &AppError) -> bool {
    err.kind() == ErrorKind::ExternalService
        && matches!(
            err.detail("failure").and_then(Value::as_str),
            Some(FAILURE_TIMEOUT) | Some(FAILURE_CONNECTION)
        )
}

fn missing_url() -> AppError {
    AppError::configuration(
        "anomaly_detection_url not configured",
        Some("APP_ANOMALY_DETECTION_URL"),
    )
}

#[async_trait]
impl Tool for HttpAnomalyDetectionTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, task: &DetectionTask, ctx: &RunContext) -> Result<ToolOutcome, AppError> {
        let payload = Self::payload(task);
        info!(tool = Self::NAME, task_id = %task.task_id, "calling detection service");
        let call = self.cfg.retry.execute(
            Self::NAME,
            |_| self.attempt(task, ctx.trace_id(), &payload),
            is_transient,
        );
        let outcome = ctx.guard(Self::NAME, call).await;
        match &outcome {
            Ok(outcome) if outcome.is_success() => {
                info!(tool = Self::NAME, task_id = %task.task_id, "detection service completed")
            }
            Ok(outcome) => info!(
                tool = Self::NAME,
                task_id = %task.task_id,
                reason = outcome.error().unwrap_or_default(),
                "detection service reported failure"
            ),
            Err(err) => error!(
                tool = Self::NAME,
                task_id = %task.task_id,
                error = %err.describe(),
                "detection service call failed"
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> HttpAnomalyDetectionTool {
        HttpAnomalyDetectionTool::new(HttpToolConfig {
            service_url: "http://detector.local/api/".to_string(),
            timeout: Duration::from_secs(1),
            retry: RetryPolicy::none(),
        })
        .unwrap()
    }

    fn task() -> DetectionTask {
        DetectionTask::new("t1", "a1", "s", "e")
    }

    #[test]
    fn missing_url_is_a_configuration_error() {
        let err = HttpAnomalyDetectionTool::from_settings(&Settings::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.config_key(), Some("APP_ANOMALY_DETECTION_URL"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(tool().service_url(), "http://detector.local/api");
    }

    #[test]
    fn payload_forwards_parameters_and_conveniences() {
        let task = task()
            .with_parameter("threshold", json!(0.9))
            .with_parameter("data", json!([1, 2, 3]))
            .with_parameter("window", json!("5m"));
        let payload = HttpAnomalyDetectionTool::payload(&task);
        assert_eq!(payload["threshold"], json!(0.9));
        assert_eq!(payload["data"], json!([1, 2, 3]));
        assert_eq!(payload["parameters"]["window"], json!("5m"));
        assert_eq!(payload["data_source"], Value::Null);

        let payload = HttpAnomalyDetectionTool::payload(&DetectionTask::new("t", "a", "s", "e"));
        assert_eq!(payload["threshold"], json!(0.5));
        assert_eq!(payload["data"], json!([]));
    }

    #[test]
    fn body_with_failed_status_is_a_failed_outcome() {
        let outcome = tool()
            .outcome_from_body(&task(), r#"{"status": "failed", "error": "no samples"}"#)
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.error(), Some("no samples"));
    }

    #[test]
    fn result_keeps_originating_task_id_and_provenance() {
        let body = r#"{"task_id": "other", "anomalies": [{"score": 0.7}], "metadata": {"model": "iforest"}}"#;
        let outcome = tool().outcome_from_body(&task(), body).unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.task_id, "t1");
        assert_eq!(result.metadata["model"], json!("iforest"));
        assert_eq!(result.metadata["tool"], json!(HttpAnomalyDetectionTool::NAME));
        assert_eq!(result.metadata["service_url"], json!("http://detector.local/api"));
    }

    #[test]
    fn unreadable_body_is_a_parse_error() {
        let err = tool().outcome_from_body(&task(), "<html>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseParse);
        assert_eq!(err.detail("raw_response"), Some(&json!("<html>")));
    }

    #[test]
    fn only_transport_failures_are_transient() {
        let timeout = AppError::external_service("t").with_detail("failure", FAILURE_TIMEOUT);
        let refused = AppError::external_service("c").with_detail("failure", FAILURE_CONNECTION);
        let rejected = AppError::external_service("s").with_detail("failure", FAILURE_STATUS);
        assert!(is_transient(&timeout));
        assert!(is_transient(&refused));
        assert!(!is_transient(&rejected));
        assert!(!is_transient(&AppError::timeout("deadline")));
    }
}
