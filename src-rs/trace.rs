use std::future::Future;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::Settings;

pub const TRACE_ID_HEADER: &str = "X-Trace-Id";
pub const TRACE_ID_HEADER_LOWER: &str = "x-trace-id";
pub const MAX_TRACE_ID_LEN: usize = 128;

tokio::task_local! {
    static TRACE_ID: String;
}

pub fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Reuses a well-formed inbound id, otherwise generates a fresh one.
pub fn resolve_trace_id(inbound: Option<&str>) -> String {
    inbound
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_TRACE_ID_LEN)
        .filter(|id| id.chars().all(|c| c.is_ascii_graphic()))
        .map(str::to_string)
        .unwrap_or_else(new_trace_id)
}

pub async fn scope_trace_id<F>(trace_id: String, fut: F) -> F::Output
where
    F: Future,
{
    TRACE_ID.scope(trace_id, fut).await
}

pub fn current_trace_id() -> Option<String> {
    TRACE_ID.try_with(|id| id.clone()).ok()
}

pub fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    let span_events = if settings.enable_tracing {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_target(false)
        .try_init();
}
