use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::openai_adapter::{OpenAIAdapter, OpenAIConfig};
use super::types::{CompletionRequest, Message, ProviderAdapter};
use crate::config::{Settings, SummaryMode};
use crate::error::AppError;
use crate::pipeline::RunContext;
use crate::result::DetectionResult;
use crate::task::DetectionTask;

pub const MOCK_SUMMARY: &str = "No critical anomalies detected (mock summary).";

const SYSTEM_PROMPT: &str = "You are an industrial anomaly-detection expert. Given the detected \
anomalies, write a short plain-language diagnosis covering the anomaly type and severity, \
likely causes, and recommended actions. If nothing was detected, state that the asset is \
operating normally.";

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(
        &self,
        task: &DetectionTask,
        result: &DetectionResult,
        ctx: &RunContext,
    ) -> Result<String, AppError>;
}

#[derive(Clone, Debug, Default)]
pub struct MockSummarizer;

impl MockSummarizer {
    pub fn describe(result: &DetectionResult) -> String {
        if result.anomalies.is_empty() {
            return MOCK_SUMMARY.to_string();
        }
        match result.max_score() {
            Some(score) => format!(
                "Detected {} anomalies, max score {:.2} (mock summary).",
                result.anomalies.len(),
                score
            ),
            None => format!("Detected {} anomalies (mock summary).", result.anomalies.len()),
        }
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn summarize(
        &self,
        _task: &DetectionTask,
        result: &DetectionResult,
        _ctx: &RunContext,
    ) -> Result<String, AppError> {
        Ok(Self::describe(result))
    }
}

pub struct LlmSummarizer {
    adapter: Arc<dyn ProviderAdapter>,
    max_prompt_tokens: usize,
}

impl LlmSummarizer {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, max_prompt_tokens: usize) -> Self {
        Self {
            adapter,
            max_prompt_tokens,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let adapter = OpenAIAdapter::new(OpenAIConfig::from_settings(settings)?)?;
        Ok(Self::new(Arc::new(adapter), settings.llm_max_prompt_tokens))
    }

    fn build_messages(task: &DetectionTask, result: &DetectionResult) -> Vec<Message> {
        let anomalies = if result.anomalies.is_empty() {
            "no anomalies".to_string()
        } else {
            Value::Array(
                result
                    .anomalies
                    .iter()
                    .cloned()
                    .map(Value::Object)
                    .collect(),
            )
            .to_string()
        };
        let user = format!(
            "Task ID: {}\nAsset ID: {}\nWindow: {} to {}\n\nDetected anomalies:\n{}\n\nWrite the diagnosis.",
            task.task_id, task.asset_id, task.start_time, task.end_time, anomalies
        );
        vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
    }
}

/// Rough token count: four characters per token.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    (chars + 3) / 4
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn summarize(
        &self,
        task: &DetectionTask,
        result: &DetectionResult,
        ctx: &RunContext,
    ) -> Result<String, AppError> {
        let messages = Self::build_messages(task, result);
        let tokens = estimate_tokens(&messages);
        if tokens > self.max_prompt_tokens {
            return Err(AppError::token_limit(tokens, self.max_prompt_tokens));
        }

        info!(task_id = %task.task_id, model = self.adapter.model(), "requesting LLM summary");
        let request = CompletionRequest {
            messages,
            temperature: None,
            model: None,
            max_tokens: None,
        };
        let response = ctx.guard("summarize", self.adapter.complete(request)).await?;
        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(AppError::response_parse(
                "LLM returned an empty summary",
                response.raw.unwrap_or(Value::Null),
            ));
        }
        Ok(summary.to_string())
    }
}

pub fn build_summarizer(settings: &Settings) -> Result<Arc<dyn Summarizer>, AppError> {
    match settings.summary_mode {
        SummaryMode::Mock => Ok(Arc::new(MockSummarizer)),
        SummaryMode::Llm => match LlmSummarizer::from_settings(settings) {
            Ok(summarizer) => Ok(Arc::new(summarizer)),
            Err(err) if settings.summary_mock_fallback => {
                warn!(reason = %err, "LLM summarizer unavailable, using mock summaries");
                Ok(Arc::new(MockSummarizer))
            }
            Err(err) => Err(err),
        },
    }
}
