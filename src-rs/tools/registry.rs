use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use super::types::Tool;
use crate::config::ToolFallback;
use crate::error::{AppError, ErrorKind};
use crate::task::DetectionTask;

pub const MOCK_TOOL: &str = "mock";
pub const HTTP_TOOL: &str = "http";

enum ToolEntry {
    Ready(Arc<dyn Tool>),
    Unavailable {
        message: String,
        config_key: Option<String>,
    },
}

pub struct ToolRegistry {
    tools: RwLock<HashMap<String, ToolEntry>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: &str, tool: Arc<dyn Tool>) -> Result<(), AppError> {
        self.insert(name, ToolEntry::Ready(tool))
    }

    pub fn register_unavailable(&self, name: &str, reason: &AppError) -> Result<(), AppError> {
        self.insert(
            name,
            ToolEntry::Unavailable {
                message: reason.message().to_string(),
                config_key: reason.config_key().map(str::to_string),
            },
        )
    }

    fn insert(&self, name: &str, entry: ToolEntry) -> Result<(), AppError> {
        if name.is_empty() {
            return Err(AppError::tool("invalid tool name", name, None));
        }
        let mut map = self.tools.write().map_err(|_| lock_error())?;
        if map.contains_key(name) {
            return Err(AppError::tool("tool already registered", name, None));
        }
        map.insert(name.to_string(), entry);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, AppError> {
        let map = self.tools.read().map_err(|_| lock_error())?;
        let entry = map.get(name).or_else(|| {
            map.values().find(|entry| match entry {
                ToolEntry::Ready(tool) => tool.name() == name,
                ToolEntry::Unavailable { .. } => false,
            })
        });
        match entry {
            Some(ToolEntry::Ready(tool)) => Ok(Arc::clone(tool)),
            Some(ToolEntry::Unavailable {
                message,
                config_key,
            }) => Err(AppError::configuration(message.clone(), config_key.as_deref())
                .with_detail("tool_name", name)),
            None => Err(AppError::tool_not_found(name)),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        match self.tools.read() {
            Ok(map) => map.contains_key(name),
            Err(_) => false,
        }
    }

    pub fn count(&self) -> usize {
        match self.tools.read() {
            Ok(map) => map.len(),
            Err(_) => 0,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let map = match self.tools.read() {
            Ok(lock) => lock,
            Err(_) => return vec![],
        };
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }
}

fn lock_error() -> AppError {
    AppError::app("tool registry lock poisoned")
}

pub struct ToolSelection {
    pub tool: Arc<dyn Tool>,
    pub requested: String,
    pub fallback_reason: Option<String>,
}

pub struct ToolSelector {
    registry: Arc<ToolRegistry>,
    default_tool: String,
    fallback: ToolFallback,
}

impl ToolSelector {
    pub fn new(registry: Arc<ToolRegistry>, default_tool: &str, fallback: ToolFallback) -> Self {
        Self {
            registry,
            default_tool: default_tool.to_string(),
            fallback,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn select(&self, task: &DetectionTask) -> Result<ToolSelection, AppError> {
        let requested = task.tool_type().unwrap_or(&self.default_tool).to_string();
        match self.registry.resolve(&requested) {
            Ok(tool) => Ok(ToolSelection {
                tool,
                requested,
                fallback_reason: None,
            }),
            Err(err)
                if err.kind() == ErrorKind::Configuration && self.fallback == ToolFallback::Mock =>
            {
                warn!(
                    requested = %requested,
                    reason = %err,
                    "requested tool unavailable, falling back to mock"
                );
                let tool = self.registry.resolve(MOCK_TOOL)?;
                Ok(ToolSelection {
                    tool,
                    requested,
                    fallback_reason: Some(err.message().to_string()),
                })
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::MockAnomalyDetectionTool;
    use serde_json::json;

    fn registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry
            .register(MOCK_TOOL, Arc::new(MockAnomalyDetectionTool::new()))
            .unwrap();
        registry
            .register_unavailable(
                HTTP_TOOL,
                &AppError::configuration("url missing", Some("APP_ANOMALY_DETECTION_URL")),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn task_for(tool: Option<&str>) -> DetectionTask {
        let task = DetectionTask::new("t1", "a1", "s", "e");
        match tool {
            Some(name) => task.with_parameter("tool_type", json!(name)),
            None => task,
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = registry();
        let err = registry
            .register(MOCK_TOOL, Arc::new(MockAnomalyDetectionTool::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tool);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.names(), vec!["http".to_string(), "mock".to_string()]);
    }

    #[test]
    fn resolves_by_key_or_tool_name() {
        let registry = registry();
        assert_eq!(registry.resolve("mock").unwrap().name(), MockAnomalyDetectionTool::NAME);
        assert!(registry.resolve(MockAnomalyDetectionTool::NAME).is_ok());
        assert_eq!(registry.resolve("nope").err().unwrap().kind(), ErrorKind::ToolNotFound);
        let err = registry.resolve(HTTP_TOOL).err().unwrap();
        assert_eq!(err.config_key(), Some("APP_ANOMALY_DETECTION_URL"));
    }

    #[test]
    fn default_tool_applies_without_tool_type() {
        let selector = ToolSelector::new(registry(), MOCK_TOOL, ToolFallback::FailFast);
        let selection = selector.select(&task_for(None)).unwrap();
        assert_eq!(selection.requested, "mock");
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn fail_fast_surfaces_the_configuration_error() {
        let selector = ToolSelector::new(registry(), MOCK_TOOL, ToolFallback::FailFast);
        let err = selector.select(&task_for(Some("http"))).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn mock_fallback_replaces_unavailable_tool() {
        let selector = ToolSelector::new(registry(), MOCK_TOOL, ToolFallback::Mock);
        let selection = selector.select(&task_for(Some("http"))).unwrap();
        assert_eq!(selection.tool.name(), MockAnomalyDetectionTool::NAME);
        assert_eq!(selection.requested, "http");
        assert_eq!(selection.fallback_reason.as_deref(), Some("url missing"));
    }

    #[test]
    fn unknown_tool_is_not_masked_by_fallback() {
        let selector = ToolSelector::new(registry(), MOCK_TOOL, ToolFallback::Mock);
        let err = selector.select(&task_for(Some("quantum"))).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ToolNotFound);
    }
}
