use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::types::{CompletionRequest, LLMResponse, Message, ProviderAdapter};
use crate::config::Settings;
use crate::error::{truncate_chars, AppError};

pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl OpenAIConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let api_key = settings.openai_api_key.clone().ok_or_else(|| {
            AppError::configuration("openai_api_key not configured", Some("APP_OPENAI_API_KEY"))
        })?;
        Ok(Self {
            api_key,
            base_url: settings.llm_base_url.clone(),
            model: settings.llm_model.clone(),
            temperature: settings.llm_temperature,
            max_tokens: settings.llm_max_tokens,
            timeout: settings.llm_timeout,
        })
    }
}

pub struct OpenAIAdapter {
    cfg: OpenAIConfig,
    client: Client,
}

impl OpenAIAdapter {
    pub fn new(mut cfg: OpenAIConfig) -> Result<Self, AppError> {
        if cfg.api_key.trim().is_empty() {
            return Err(AppError::configuration(
                "openai_api_key not configured",
                Some("APP_OPENAI_API_KEY"),
            ));
        }
        if cfg.base_url.is_empty() {
            cfg.base_url = "https://api.openai.com/v1".to_string();
        }
        if cfg.model.is_empty() {
            cfg.model = "gpt-4o-mini".to_string();
        }
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|err| AppError::configuration("failed to build LLM client", None).with_source(err))?;
        Ok(Self { cfg, client })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIAdapter {
    fn model(&self) -> &str {
        &self.cfg.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<LLMResponse, AppError> {
        let model = request.model.clone().unwrap_or_else(|| self.cfg.model.clone());
        let payload = build_payload(
            &model,
            &request.messages,
            request.temperature.unwrap_or(self.cfg.temperature),
            request.max_tokens.unwrap_or(self.cfg.max_tokens),
        );
        let endpoint = format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'));

        let resp = self
            .client
            .post(endpoint)
            .bearer_auth(&self.cfg.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                let message = if err.is_timeout() {
                    "LLM request timed out"
                } else {
                    "LLM request failed"
                };
                AppError::model(message, &model, None).with_source(err)
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| AppError::model("failed to read LLM response", &model, None).with_source(err))?;
        if !status.is_success() {
            return Err(AppError::model(
                format!("LLM service returned {}", status.as_u16()),
                &model,
                Some(status.as_u16()),
            )
            .with_detail("response_preview", truncate_chars(&body, 200)));
        }

        let raw: Value = serde_json::from_str(&body).map_err(|err| {
            AppError::response_parse("LLM returned invalid JSON", &body).with_source(err)
        })?;
        parse_response(raw)
    }
}

fn build_payload(model: &str, messages: &[Message], temperature: f64, max_tokens: u32) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
    })
}

fn parse_response(raw: Value) -> Result<LLMResponse, AppError> {
    let choice = raw
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first());
    let content = choice
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str);
    let content = match content {
        Some(text) => text.to_string(),
        None => return Err(AppError::response_parse("LLM response has no message content", &raw)),
    };
    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let total_tokens = raw
        .get("usage")
        .and_then(|u| u.get("total_tokens"))
        .and_then(Value::as_u64);
    Ok(LLMResponse {
        content,
        finish_reason,
        total_tokens,
        raw: Some(raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_generation_settings() {
        let payload = build_payload("gpt-4o-mini", &[Message::user("hi")], 0.3, 500);
        assert_eq!(payload["model"], json!("gpt-4o-mini"));
        assert_eq!(payload["messages"][0]["role"], json!("user"));
        assert_eq!(payload["max_tokens"], json!(500));
    }

    #[test]
    fn parses_first_choice() {
        let raw = json!({
            "choices": [{"message": {"role": "assistant", "content": "all good"}, "finish_reason": "stop"}],
            "usage": {"total_tokens": 42}
        });
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.content, "all good");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.total_tokens, Some(42));
    }

    #[test]
    fn missing_content_is_a_parse_error() {
        let err = parse_response(json!({"choices": []})).unwrap_err();
        assert_eq!(err.code(), "response_parse");
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = OpenAIAdapter::new(OpenAIConfig {
            api_key: " ".to_string(),
            base_url: String::new(),
            model: String::new(),
            temperature: 0.3,
            max_tokens: 100,
            timeout: Duration::from_secs(1),
        })
        .err()
        .unwrap();
        assert_eq!(err.config_key(), Some("APP_OPENAI_API_KEY"));
    }
}
