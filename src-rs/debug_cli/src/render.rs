use std::io::{self, Write};

use serde_json::Value;

use crate::models::{CLIConfig, DetectResponse, HistoryEntry, Traced};

pub fn banner(cfg: &CLIConfig) {
    println!("Anomaly Agent Debug CLI");
    println!("API: {}", cfg.base_url);
    println!(
        "Asset: {}  Window: {} .. {}",
        cfg.asset_id, cfg.start_time, cfg.end_time
    );
    println!("Type a task id to run detection, /help for commands.");
}

pub fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

pub fn help() {
    println!("Commands:");
    println!("  /help                  Show commands");
    println!("  /exit | /quit          Exit");
    println!("  /health                Call GET /health");
    println!("  /info                  Call GET /");
    println!("  /asset <id>            Set asset id");
    println!("  /window <start> <end>  Set detection window");
    println!("  /source [name]         Set or clear data source");
    println!("  /param <key>=<value>   Set a task parameter (JSON values accepted)");
    println!("  /params                Show task parameters");
    println!("  /clear                 Clear task parameters");
    println!("  /tool [mock|http]      Set or clear tool_type");
    println!("  /trace [id]            Set or clear the X-Trace-Id sent");
    println!("  /history               Show submitted tasks");
    println!("  /config                Show current config");
    println!("  /base <url>            Update base URL");
    println!("  <task id>              Submit a detection task");
}

pub fn detection(resp: &Traced<DetectResponse>) {
    let result = &resp.body;
    println!("[{}] task {}", result.status, result.task_id);
    if result.anomalies.is_empty() {
        println!("  no anomalies");
    }
    for anomaly in &result.anomalies {
        println!(
            "  - {} score={} type={}",
            field(anomaly, "timestamp"),
            field(anomaly, "score"),
            field(anomaly, "type")
        );
    }
    if let Some(summary) = &result.summary {
        println!("summary: {}", summary);
    }
    if let Some(Value::Array(errors)) = result.metadata.get("errors") {
        for err in errors {
            println!(
                "error: [{}] {} {}",
                field(err, "step"),
                field(err, "code"),
                field(err, "message")
            );
        }
    }
    trace(resp.trace_id.as_deref());
}

pub fn json(resp: &Traced<Value>) {
    match serde_json::to_string_pretty(&resp.body) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", resp.body),
    }
    trace(resp.trace_id.as_deref());
}

fn trace(trace_id: Option<&str>) {
    if let Some(id) = trace_id {
        println!("trace: {}", id);
    }
}

fn field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "-".to_string(),
    }
}

pub fn config(cfg: &CLIConfig) {
    println!("config:");
    println!("  base: {}", cfg.base_url);
    println!("  asset: {}", cfg.asset_id);
    println!("  window: {} .. {}", cfg.start_time, cfg.end_time);
    println!("  source: {}", cfg.data_source.clone().unwrap_or_default());
    println!("  tool: {}", cfg.tool_type.clone().unwrap_or_else(|| "(server default)".to_string()));
    println!("  trace: {}", cfg.trace_id.clone().unwrap_or_else(|| "(generated)".to_string()));
    println!("  timeout: {}s", cfg.timeout_secs);
}

pub fn params(cfg: &CLIConfig) {
    if cfg.parameters.is_empty() {
        println!("no parameters");
        return;
    }
    for (key, value) in &cfg.parameters {
        println!("  {} = {}", key, value);
    }
}

pub fn history(items: &[HistoryEntry]) {
    if items.is_empty() {
        println!("no history");
        return;
    }
    for entry in items {
        println!(
            "{} -> {} (trace {})",
            entry.task_id,
            entry.outcome,
            entry.trace_id.clone().unwrap_or_default()
        );
    }
}

pub fn info(msg: &str) {
    println!("{}", msg);
}

pub fn error(msg: &str) {
    eprintln!("error: {}", msg);
}
