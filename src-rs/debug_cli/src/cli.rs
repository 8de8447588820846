use std::env;

use serde_json::Map;

use crate::models::CLIConfig;

const DEFAULT_URL: &str = "http://localhost:8000";
const DEFAULT_START: &str = "2025-01-01T00:00:00Z";
const DEFAULT_END: &str = "2025-01-01T01:00:00Z";

pub fn parse_config() -> CLIConfig {
    let mut cfg = CLIConfig {
        base_url: env_or("ANOMALY_AGENT_URL", DEFAULT_URL.to_string()),
        asset_id: env_or("ANOMALY_AGENT_ASSET", "asset-1".to_string()),
        start_time: DEFAULT_START.to_string(),
        end_time: DEFAULT_END.to_string(),
        data_source: env_opt("ANOMALY_AGENT_SOURCE"),
        tool_type: env_opt("ANOMALY_AGENT_TOOL"),
        parameters: Map::new(),
        trace_id: None,
        timeout_secs: env_u64("ANOMALY_AGENT_TIMEOUT", 90),
    };

    let args: Vec<String> = env::args().collect();
    let mut idx = 1;
    while idx < args.len() {
        let value = args.get(idx + 1).cloned();
        let consumed = match (args[idx].as_str(), value) {
            ("--base", Some(value)) => {
                cfg.base_url = value;
                true
            }
            ("--asset", Some(value)) => {
                cfg.asset_id = value;
                true
            }
            ("--start", Some(value)) => {
                cfg.start_time = value;
                true
            }
            ("--end", Some(value)) => {
                cfg.end_time = value;
                true
            }
            ("--source", Some(value)) => {
                cfg.data_source = Some(value);
                true
            }
            ("--tool", Some(value)) => {
                cfg.tool_type = Some(value);
                true
            }
            ("--timeout", Some(value)) => {
                if let Ok(parsed) = value.parse::<u64>() {
                    cfg.timeout_secs = parsed;
                }
                true
            }
            _ => false,
        };
        idx += if consumed { 2 } else { 1 };
    }

    cfg
}

fn env_or(key: &str, fallback: String) -> String {
    env::var(key).unwrap_or(fallback)
}

fn env_opt(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn env_u64(key: &str, fallback: u64) -> u64 {
    match env::var(key) {
        Ok(value) => value.parse::<u64>().unwrap_or(fallback),
        Err(_) => fallback,
    }
}
