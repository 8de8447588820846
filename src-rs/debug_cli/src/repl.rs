use std::io;

use serde_json::Value;

use crate::client::HTTPClient;
use crate::models::{CLIConfig, DetectRequest, HistoryEntry};
use crate::render;

pub struct REPL {
    pub config: CLIConfig,
    pub client: HTTPClient,
    pub history: Vec<HistoryEntry>,
}

impl REPL {
    pub fn new(config: CLIConfig, client: HTTPClient) -> Self {
        Self {
            config,
            client,
            history: Vec::new(),
        }
    }

    pub fn run(&mut self) {
        render::banner(&self.config);
        loop {
            render::prompt();
            let mut line = String::new();
            match io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('/') {
                if self.handle_command(&line) {
                    break;
                }
                continue;
            }
            self.submit(&line);
        }
    }

    fn handle_command(&mut self, line: &str) -> bool {
        let mut parts = line.splitn(2, ' ');
        let cmd = parts.next().unwrap_or("").trim_start_matches('/');
        let rest = parts.next().unwrap_or("").trim();
        match cmd {
            "exit" | "quit" => return true,
            "help" => render::help(),
            "health" => match self.client.health() {
                Ok(resp) => render::json(&resp),
                Err(err) => render::error(&err),
            },
            "info" => match self.client.info() {
                Ok(resp) => render::json(&resp),
                Err(err) => render::error(&err),
            },
            "asset" => {
                if rest.is_empty() {
                    render::info(&format!("asset: {}", self.config.asset_id));
                } else {
                    self.config.asset_id = rest.to_string();
                    render::info("asset updated");
                }
            }
            "window" => {
                let bounds: Vec<&str> = rest.split_whitespace().collect();
                if let [start, end] = bounds.as_slice() {
                    self.config.start_time = start.to_string();
                    self.config.end_time = end.to_string();
                    render::info("window updated");
                } else {
                    render::error("usage: /window <start> <end>");
                }
            }
            "source" => {
                self.config.data_source = non_empty(rest);
                render::info("data source updated");
            }
            "param" => match parse_param(rest) {
                Some((key, value)) => {
                    self.config.parameters.insert(key, value);
                    render::info("parameter set");
                }
                None => render::error("usage: /param <key>=<value>"),
            },
            "params" => render::params(&self.config),
            "clear" => {
                self.config.parameters.clear();
                render::info("parameters cleared");
            }
            "tool" => {
                self.config.tool_type = non_empty(rest);
                render::info("tool updated");
            }
            "trace" => {
                self.config.trace_id = non_empty(rest);
                render::info("trace id updated");
            }
            "history" => render::history(&self.history),
            "config" => render::config(&self.config),
            "base" => {
                if rest.is_empty() {
                    render::info(&format!("base: {}", self.config.base_url));
                } else {
                    match HTTPClient::new(rest, self.config.timeout_secs) {
                        Ok(client) => {
                            self.config.base_url = rest.to_string();
                            self.client = client;
                            render::info("base url updated");
                        }
                        Err(err) => render::error(&err),
                    }
                }
            }
            _ => render::info("unknown command, type /help"),
        }
        false
    }

    fn submit(&mut self, task_id: &str) {
        let mut parameters = self.config.parameters.clone();
        if let Some(tool) = &self.config.tool_type {
            parameters.insert("tool_type".to_string(), Value::String(tool.clone()));
        }
        let req = DetectRequest {
            task_id: task_id.to_string(),
            asset_id: self.config.asset_id.clone(),
            start_time: self.config.start_time.clone(),
            end_time: self.config.end_time.clone(),
            data_source: self.config.data_source.clone(),
            parameters,
        };

        match self.client.detect(&req, self.config.trace_id.as_deref()) {
            Ok(resp) => {
                self.history.push(HistoryEntry {
                    task_id: task_id.to_string(),
                    outcome: format!("{} ({} anomalies)", resp.body.status, resp.body.anomalies.len()),
                    trace_id: resp.trace_id.clone(),
                });
                render::detection(&resp);
            }
            Err(err) => {
                self.history.push(HistoryEntry {
                    task_id: task_id.to_string(),
                    outcome: "error".to_string(),
                    trace_id: self.config.trace_id.clone(),
                });
                render::error(&err);
            }
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// `key=value`; the value is parsed as JSON and kept as a string otherwise.
fn parse_param(raw: &str) -> Option<(String, Value)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Some((key.to_string(), parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_accept_json_or_plain_text() {
        assert_eq!(parse_param("threshold=0.9"), Some(("threshold".to_string(), json!(0.9))));
        assert_eq!(parse_param("data=[1,2]"), Some(("data".to_string(), json!([1, 2]))));
        assert_eq!(parse_param("mode = fast"), Some(("mode".to_string(), json!("fast"))));
        assert_eq!(parse_param("=1"), None);
        assert_eq!(parse_param("novalue"), None);
    }
}
