use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::{DetectRequest, DetectResponse, ErrorResponse, Traced};

const TRACE_HEADER: &str = "X-Trace-Id";

pub struct HTTPClient {
    pub base_url: String,
    client: Client,
}

impl HTTPClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|err| err.to_string())?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn health(&self) -> Result<Traced<Value>, String> {
        self.call(self.client.get(format!("{}/health", self.base_url)), None)
    }

    pub fn info(&self) -> Result<Traced<Value>, String> {
        self.call(self.client.get(format!("{}/", self.base_url)), None)
    }

    pub fn detect(
        &self,
        req: &DetectRequest,
        trace_id: Option<&str>,
    ) -> Result<Traced<DetectResponse>, String> {
        let builder = self
            .client
            .post(format!("{}/v1/detect", self.base_url))
            .json(req);
        self.call(builder, trace_id)
    }

    fn call<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        trace_id: Option<&str>,
    ) -> Result<Traced<T>, String> {
        let builder = match trace_id {
            Some(id) => builder.header(TRACE_HEADER, id),
            None => builder,
        };
        let resp = builder.send().map_err(|err| err.to_string())?;
        let trace_id = echoed_trace(&resp);
        let status = resp.status();
        if status.is_success() {
            let body = resp.json::<T>().map_err(|err| err.to_string())?;
            return Ok(Traced { body, trace_id });
        }
        let text = resp.text().unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(err) => Err(format!(
                "http {} [{}] {} (trace {})",
                status.as_u16(),
                err.code,
                err.message,
                err.trace_id.or(trace_id).unwrap_or_default()
            )),
            Err(_) => Err(format!("http {}: {}", status.as_u16(), text)),
        }
    }
}

fn echoed_trace(resp: &Response) -> Option<String> {
    resp.headers()
        .get(TRACE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
