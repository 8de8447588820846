use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, info_span, Instrument};

use crate::trace::{resolve_trace_id, scope_trace_id, TRACE_ID_HEADER, TRACE_ID_HEADER_LOWER};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceId(pub String);

pub async fn trace_id_middleware<B>(mut req: Request<B>, next: Next<B>) -> Response {
    let inbound = req
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    let trace_id = resolve_trace_id(inbound);
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path()
    );
    let mut response = scope_trace_id(trace_id.clone(), next.run(req))
        .instrument(span.clone())
        .await;

    span.in_scope(|| info!(status = response.status().as_u16(), "request completed"));
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(TRACE_ID_HEADER_LOWER), value);
    }
    response
}
