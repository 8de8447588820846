use std::error::Error as StdError;
use std::fmt::Display;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub type Details = Map<String, Value>;
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub const RAW_RESPONSE_LIMIT: usize = 500;
pub const USER_INPUT_LIMIT: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    App,
    Timeout,
    DataMissing,
    ExternalService,
    Model,
    Tool,
    ToolNotFound,
    ToolExecutionFailed,
    Context,
    TokenLimitExceeded,
    MaxTurnsExceeded,
    ResponseParse,
    Configuration,
    Stream,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::App => "app_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::DataMissing => "data_missing",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::Model => "model_error",
            // sub-kinds share the family code; `kind()` tells them apart
            ErrorKind::Tool | ErrorKind::ToolNotFound | ErrorKind::ToolExecutionFailed => "tool_error",
            ErrorKind::Context => "context_error",
            ErrorKind::TokenLimitExceeded => "token_limit",
            ErrorKind::MaxTurnsExceeded => "max_turns",
            ErrorKind::ResponseParse => "response_parse",
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::Stream => "stream_error",
        }
    }

    /// Transport status used when the error instance does not override it.
    pub fn default_status(self) -> u16 {
        match self {
            ErrorKind::Timeout => 504,
            ErrorKind::DataMissing => 422,
            ErrorKind::ExternalService => 502,
            _ => 500,
        }
    }

    pub fn parent(self) -> Option<ErrorKind> {
        match self {
            ErrorKind::ToolNotFound | ErrorKind::ToolExecutionFailed => Some(ErrorKind::Tool),
            ErrorKind::TokenLimitExceeded => Some(ErrorKind::Context),
            _ => None,
        }
    }

    pub fn is_a(self, family: ErrorKind) -> bool {
        self == family || self.parent() == Some(family)
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    details: Details,
    status: Option<u16>,
    #[source]
    source: Option<BoxError>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Details::new(),
            status: None,
            source: None,
        }
    }

    pub fn app(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::App, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn data_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataMissing, message)
    }

    pub fn external_service(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalService, message)
    }

    pub fn model(message: impl Into<String>, model_name: &str, status_code: Option<u16>) -> Self {
        Self::new(ErrorKind::Model, message)
            .with_detail("model_name", model_name)
            .with_detail("status_code", status_code)
    }

    pub fn tool(message: impl Into<String>, tool_name: &str, arguments: Option<Value>) -> Self {
        Self::new(ErrorKind::Tool, message)
            .with_detail("tool_name", tool_name)
            .with_detail("arguments", arguments)
    }

    pub fn tool_not_found(tool_name: &str) -> Self {
        Self::new(ErrorKind::ToolNotFound, format!("tool not found: {}", tool_name))
            .with_detail("tool_name", tool_name)
            .with_detail("arguments", Value::Null)
    }

    pub fn tool_execution_failed(
        tool_name: &str,
        arguments: Option<Value>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self::new(
            ErrorKind::ToolExecutionFailed,
            format!("tool '{}' execution failed", tool_name),
        )
        .with_detail("tool_name", tool_name)
        .with_detail("arguments", arguments)
        .with_source(cause)
    }

    pub fn context(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Context, message)
    }

    pub fn token_limit(current_tokens: usize, max_tokens: usize) -> Self {
        Self::new(
            ErrorKind::TokenLimitExceeded,
            format!("token count exceeds limit: {} > {}", current_tokens, max_tokens),
        )
        .with_detail("current_tokens", current_tokens)
        .with_detail("max_tokens", max_tokens)
    }

    pub fn max_turns(max_turns: usize) -> Self {
        Self::new(
            ErrorKind::MaxTurnsExceeded,
            format!("maximum turns reached ({}), possible infinite loop", max_turns),
        )
        .with_detail("max_turns", max_turns)
    }

    pub fn response_parse(message: impl Into<String>, raw_response: impl Display) -> Self {
        let raw = raw_response.to_string();
        Self::new(ErrorKind::ResponseParse, message)
            .with_detail("raw_response", truncate_chars(&raw, RAW_RESPONSE_LIMIT))
    }

    pub fn configuration(message: impl Into<String>, config_key: Option<&str>) -> Self {
        let err = Self::new(ErrorKind::Configuration, message);
        match config_key {
            Some(key) => err.with_detail("config_key", key),
            None => err,
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Stream, message)
    }

    pub fn with_detail(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details.extend(details);
        self
    }

    pub fn with_source(mut self, cause: impl Into<BoxError>) -> Self {
        self.source = Some(cause.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_agent_context(mut self, agent_name: Option<&str>, user_input: Option<&str>) -> Self {
        if let Some(name) = agent_name.filter(|name| !name.is_empty()) {
            self = self.with_detail("agent_name", name);
        }
        if let Some(input) = user_input.filter(|input| !input.is_empty()) {
            self = self.with_detail("user_input", truncate_chars(input, USER_INPUT_LIMIT));
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or_else(|| self.kind.default_status())
    }

    pub fn config_key(&self) -> Option<&str> {
        self.detail("config_key").and_then(Value::as_str)
    }

    pub fn is(&self, family: ErrorKind) -> bool {
        self.kind.is_a(family)
    }

    pub fn describe(&self) -> String {
        let mut out = format!("{}: {}", self.code(), self.message);
        let mut cause = StdError::source(self);
        while let Some(err) = cause {
            out.push_str(&format!(" (cause: {})", err));
            cause = err.source();
        }
        out
    }
}

pub fn truncate_chars(value: &str, limit: usize) -> String {
    match value.char_indices().nth(limit) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}
