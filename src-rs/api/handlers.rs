use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use super::middleware::TraceId;
use crate::config::Settings;
use crate::error::AppError;
use crate::pipeline::{ExecutionState, Pipeline, RunContext};
use crate::result::DetectionResult;
use crate::task::DetectionTask;
use crate::trace::current_trace_id;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pipeline: Arc<Pipeline>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        error!(code = self.code(), status = status.as_u16(), error = %self.describe(), "request failed");
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.message().to_string(),
            trace_id: current_trace_id(),
        };
        (status, Json(body)).into_response()
    }
}

pub async fn handle_root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "app": state.settings.app_name,
        "version": env!("CARGO_PKG_VERSION"),
        "message": "Industrial anomaly detection agent",
        "endpoints": ["/health", "/v1/detect"],
    }))
}

pub async fn handle_health() -> Json<Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

pub async fn handle_detect(
    State(state): State<AppState>,
    Extension(TraceId(trace_id)): Extension<TraceId>,
    payload: Result<Json<DetectionTask>, JsonRejection>,
) -> Result<Json<DetectionResult>, AppError> {
    let Json(task) = payload.map_err(rejection_error)?;
    task.validate()?;

    info!(task_id = %task.task_id, asset_id = %task.asset_id, "detection requested");
    let ctx = RunContext::new(trace_id).with_timeout(state.settings.request_timeout);
    let outcome = state.pipeline.run(ExecutionState::new(task), &ctx).await;
    let result = outcome.into_result()?.into_result();
    info!(task_id = %result.task_id, status = ?result.status, anomalies = result.anomalies.len(), "detection finished");
    Ok(Json(result))
}

fn rejection_error(rejection: JsonRejection) -> AppError {
    let status = rejection.status();
    let err = if status == StatusCode::UNPROCESSABLE_ENTITY {
        AppError::data_missing(rejection.body_text())
    } else {
        AppError::app(rejection.body_text())
    };
    err.with_status(status.as_u16())
}
