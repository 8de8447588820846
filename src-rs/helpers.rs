use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{CheckpointBackend, Settings};
use crate::error::AppError;
use crate::llm::build_summarizer;
use crate::pipeline::{DetectAnomaliesStep, LoadDataStep, Pipeline, SummarizeStep};
use crate::task::{CheckpointStore, MemoryCheckpointStore};
use crate::tools::{HttpAnomalyDetectionTool, MockAnomalyDetectionTool, ToolRegistry, ToolSelector, HTTP_TOOL, MOCK_TOOL};

pub const PIPELINE_NAME: &str = "anomaly_detection";

pub fn build_tool_registry(settings: &Settings) -> Result<ToolRegistry, AppError> {
    let registry = ToolRegistry::new();
    registry.register(MOCK_TOOL, Arc::new(MockAnomalyDetectionTool::new()))?;

    match HttpAnomalyDetectionTool::from_settings(settings) {
        Ok(tool) => registry.register(HTTP_TOOL, Arc::new(tool))?,
        Err(err) => {
            if settings.default_tool == HTTP_TOOL {
                warn!(reason = %err, "default tool is http but it is not configured");
            }
            registry.register_unavailable(HTTP_TOOL, &err)?;
        }
    }

    if !registry.has(&settings.default_tool) {
        return Err(AppError::configuration(
            format!("unknown default tool: {}", settings.default_tool),
            Some("APP_DEFAULT_TOOL"),
        ));
    }
    Ok(registry)
}

pub fn build_checkpoint_store(settings: &Settings) -> Option<Arc<dyn CheckpointStore>> {
    if !settings.enable_checkpoint {
        return None;
    }
    match settings.checkpoint_store {
        CheckpointBackend::Memory => {
            Some(Arc::new(MemoryCheckpointStore::new(Some(settings.checkpoint_ttl))))
        }
    }
}

pub fn build_pipeline(settings: &Settings) -> Result<Pipeline, AppError> {
    let registry = Arc::new(build_tool_registry(settings)?);
    let selector = Arc::new(ToolSelector::new(
        registry,
        &settings.default_tool,
        settings.tool_fallback,
    ));
    let summarizer = build_summarizer(settings)?;

    let mut builder = Pipeline::builder(PIPELINE_NAME)
        .step(Arc::new(LoadDataStep))
        .step(Arc::new(DetectAnomaliesStep::new(selector)))
        .step(Arc::new(SummarizeStep::new(summarizer)))
        .max_turns(settings.max_turns);
    if let Some(store) = build_checkpoint_store(settings) {
        builder = builder.checkpoints(store);
    }
    let pipeline = builder.build()?;
    info!(
        pipeline = pipeline.name(),
        steps = ?pipeline.step_names(),
        max_turns = pipeline.max_turns(),
        "pipeline ready"
    );
    Ok(pipeline)
}
