use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

pub const ENV_PREFIX: &str = "APP_";
pub const MAX_DURATION_SECS: f64 = 7.0 * 86_400.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolFallback {
    FailFast,
    Mock,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryMode {
    Mock,
    Llm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointBackend {
    Memory,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub app_name: String,
    pub log_level: String,
    pub enable_tracing: bool,
    pub port: u16,
    pub max_turns: usize,
    pub request_timeout: Duration,
    pub default_tool: String,
    pub tool_fallback: ToolFallback,
    pub anomaly_detection_url: Option<String>,
    pub anomaly_detection_timeout: Duration,
    pub anomaly_detection_retries: u32,
    pub retry_initial_backoff: Duration,
    pub retry_max_elapsed: Duration,
    pub openai_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f64,
    pub llm_timeout: Duration,
    pub llm_max_tokens: u32,
    pub llm_max_prompt_tokens: usize,
    pub summary_mode: SummaryMode,
    pub summary_mock_fallback: bool,
    pub enable_checkpoint: bool,
    pub checkpoint_store: CheckpointBackend,
    pub checkpoint_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "industrial-anomaly-agent".to_string(),
            log_level: "info".to_string(),
            enable_tracing: false,
            port: 8000,
            max_turns: 10,
            request_timeout: Duration::from_secs(60),
            default_tool: "mock".to_string(),
            tool_fallback: ToolFallback::Mock,
            anomaly_detection_url: None,
            anomaly_detection_timeout: Duration::from_secs(30),
            anomaly_detection_retries: 3,
            retry_initial_backoff: Duration::from_millis(200),
            retry_max_elapsed: Duration::from_secs(30),
            openai_api_key: None,
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_temperature: 0.3,
            llm_timeout: Duration::from_secs(30),
            llm_max_tokens: 500,
            llm_max_prompt_tokens: 4000,
            summary_mode: SummaryMode::Mock,
            summary_mock_fallback: false,
            enable_checkpoint: false,
            checkpoint_store: CheckpointBackend::Memory,
            checkpoint_ttl: Duration::from_secs(3600),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_map(values: &HashMap<String, String>) -> Result<Self, AppError> {
        Self::from_lookup(|key| values.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Source { lookup };
        let mut cfg = Settings::default();

        if let Some(value) = src.string("APP_NAME") {
            cfg.app_name = value;
        }
        if let Some(value) = src.string("LOG_LEVEL") {
            cfg.log_level = value.to_lowercase();
        }
        cfg.enable_tracing = src.flag("ENABLE_TRACING", cfg.enable_tracing)?;
        cfg.port = src.parse("PORT", cfg.port)?;
        cfg.max_turns = src.parse("MAX_TURNS", cfg.max_turns)?;
        if cfg.max_turns == 0 {
            return Err(AppError::configuration(
                "max_turns must be at least 1",
                Some("APP_MAX_TURNS"),
            ));
        }
        cfg.request_timeout = src.seconds("REQUEST_TIMEOUT", cfg.request_timeout)?;

        if let Some(value) = src.string("DEFAULT_TOOL") {
            cfg.default_tool = value;
        }
        if let Some(value) = src.string("TOOL_FALLBACK") {
            cfg.tool_fallback = match value.to_lowercase().as_str() {
                "mock" => ToolFallback::Mock,
                "fail_fast" | "fail-fast" | "none" => ToolFallback::FailFast,
                other => return Err(invalid("APP_TOOL_FALLBACK", other)),
            };
        }

        cfg.anomaly_detection_url = src
            .string("ANOMALY_DETECTION_URL")
            .map(|url| url.trim_end_matches('/').to_string());
        cfg.anomaly_detection_timeout =
            src.seconds("ANOMALY_DETECTION_TIMEOUT", cfg.anomaly_detection_timeout)?;
        cfg.anomaly_detection_retries =
            src.parse("ANOMALY_DETECTION_RETRIES", cfg.anomaly_detection_retries)?;
        cfg.retry_initial_backoff = Duration::from_millis(src.parse(
            "RETRY_INITIAL_BACKOFF_MS",
            cfg.retry_initial_backoff.as_millis() as u64,
        )?);
        cfg.retry_max_elapsed = src.seconds("RETRY_MAX_ELAPSED", cfg.retry_max_elapsed)?;

        cfg.openai_api_key = src.string("OPENAI_API_KEY");
        if let Some(value) = src.string("LLM_BASE_URL") {
            cfg.llm_base_url = value.trim_end_matches('/').to_string();
        }
        if let Some(value) = src.string("LLM_MODEL") {
            cfg.llm_model = value;
        }
        cfg.llm_temperature = src.parse("LLM_TEMPERATURE", cfg.llm_temperature)?;
        cfg.llm_timeout = src.seconds("LLM_TIMEOUT", cfg.llm_timeout)?;
        cfg.llm_max_tokens = src.parse("LLM_MAX_TOKENS", cfg.llm_max_tokens)?;
        cfg.llm_max_prompt_tokens = src.parse("LLM_MAX_PROMPT_TOKENS", cfg.llm_max_prompt_tokens)?;
        if let Some(value) = src.string("SUMMARY_MODE") {
            cfg.summary_mode = match value.to_lowercase().as_str() {
                "mock" => SummaryMode::Mock,
                "llm" => SummaryMode::Llm,
                other => return Err(invalid("APP_SUMMARY_MODE", other)),
            };
        }
        cfg.summary_mock_fallback = src.flag("SUMMARY_MOCK_FALLBACK", cfg.summary_mock_fallback)?;

        cfg.enable_checkpoint = src.flag("ENABLE_CHECKPOINT", cfg.enable_checkpoint)?;
        if let Some(value) = src.string("CHECKPOINT_STORE_TYPE") {
            cfg.checkpoint_store = match value.to_lowercase().as_str() {
                "memory" => CheckpointBackend::Memory,
                other => {
                    return Err(AppError::configuration(
                        format!("unsupported checkpoint store: {}", other),
                        Some("APP_CHECKPOINT_STORE_TYPE"),
                    ))
                }
            };
        }
        cfg.checkpoint_ttl = Duration::from_secs(src.parse("CHECKPOINT_TTL", cfg.checkpoint_ttl.as_secs())?);

        Ok(cfg)
    }
}

struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        let key = format!("{}{}", ENV_PREFIX, name);
        (self.lookup)(&key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T: FromStr>(&self, name: &str, fallback: T) -> Result<T, AppError> {
        match self.string(name) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|_| invalid(&format!("{}{}", ENV_PREFIX, name), &raw)),
            None => Ok(fallback),
        }
    }

    fn flag(&self, name: &str, fallback: bool) -> Result<bool, AppError> {
        match self.string(name) {
            Some(raw) => match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(invalid(&format!("{}{}", ENV_PREFIX, name), &raw)),
            },
            None => Ok(fallback),
        }
    }

    fn seconds(&self, name: &str, fallback: Duration) -> Result<Duration, AppError> {
        let key = format!("{}{}", ENV_PREFIX, name);
        let secs: f64 = self.parse(name, fallback.as_secs_f64())?;
        if !secs.is_finite() || secs <= 0.0 || secs > MAX_DURATION_SECS {
            return Err(invalid(&key, &secs.to_string()));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

fn invalid(key: &str, raw: &str) -> AppError {
    AppError::configuration(format!("invalid value for {}: {}", key, raw), Some(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, AppError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_map(&map)
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = settings(&[]).unwrap();
        assert_eq!(cfg.app_name, "industrial-anomaly-agent");
        assert_eq!(cfg.max_turns, 10);
        assert_eq!(cfg.tool_fallback, ToolFallback::Mock);
        assert_eq!(cfg.summary_mode, SummaryMode::Mock);
        assert!(cfg.anomaly_detection_url.is_none());
        assert_eq!(cfg.anomaly_detection_retries, 3);
    }

    #[test]
    fn reads_prefixed_values() {
        let cfg = settings(&[
            ("APP_MAX_TURNS", "4"),
            ("APP_ANOMALY_DETECTION_URL", "http://detector:8080/api/"),
            ("APP_ANOMALY_DETECTION_TIMEOUT", "2.5"),
            ("APP_TOOL_FALLBACK", "fail_fast"),
            ("APP_SUMMARY_MODE", "llm"),
            ("APP_ENABLE_CHECKPOINT", "true"),
        ])
        .unwrap();
        assert_eq!(cfg.max_turns, 4);
        assert_eq!(cfg.anomaly_detection_url.as_deref(), Some("http://detector:8080/api"));
        assert_eq!(cfg.anomaly_detection_timeout, Duration::from_millis(2500));
        assert_eq!(cfg.tool_fallback, ToolFallback::FailFast);
        assert_eq!(cfg.summary_mode, SummaryMode::Llm);
        assert!(cfg.enable_checkpoint);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = settings(&[("APP_OPENAI_API_KEY", "   "), ("APP_LLM_MODEL", "")]).unwrap();
        assert!(cfg.openai_api_key.is_none());
        assert_eq!(cfg.llm_model, "gpt-4o-mini");
    }

    #[test]
    fn bad_values_name_the_offending_key() {
        let err = settings(&[("APP_MAX_TURNS", "many")]).unwrap_err();
        assert_eq!(err.config_key(), Some("APP_MAX_TURNS"));

        let err = settings(&[("APP_ENABLE_TRACING", "maybe")]).unwrap_err();
        assert_eq!(err.config_key(), Some("APP_ENABLE_TRACING"));

        let err = settings(&[("APP_REQUEST_TIMEOUT", "-1")]).unwrap_err();
        assert_eq!(err.config_key(), Some("APP_REQUEST_TIMEOUT"));

        let err = settings(&[("APP_REQUEST_TIMEOUT", "1e19")]).unwrap_err();
        assert_eq!(err.config_key(), Some("APP_REQUEST_TIMEOUT"));

        let err = settings(&[("APP_ANOMALY_DETECTION_TIMEOUT", "1e300")]).unwrap_err();
        assert_eq!(err.config_key(), Some("APP_ANOMALY_DETECTION_TIMEOUT"));

        let err = settings(&[("APP_CHECKPOINT_STORE_TYPE", "redis")]).unwrap_err();
        assert_eq!(err.config_key(), Some("APP_CHECKPOINT_STORE_TYPE"));
    }

    #[test]
    fn zero_turns_is_rejected() {
        let err = settings(&[("APP_MAX_TURNS", "0")]).unwrap_err();
        assert_eq!(err.config_key(), Some("APP_MAX_TURNS"));
    }
}
