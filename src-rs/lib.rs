pub mod config;
pub mod error;
pub mod helpers;
pub mod result;
pub mod trace;

#[path = "llm/lib.rs"]
pub mod llm;
#[path = "tools/lib.rs"]
pub mod tools;
#[path = "task/lib.rs"]
pub mod task;
#[path = "pipeline/lib.rs"]
pub mod pipeline;
#[path = "api/lib.rs"]
pub mod api;

pub use crate::config::Settings;
pub use crate::error::{AppError, ErrorKind};
pub use crate::helpers::build_pipeline;
pub use crate::result::{DetectionResult, DetectionStatus};
pub use crate::task::DetectionTask;
pub use crate::pipeline::{ExecutionState, Pipeline, RunContext};
pub use crate::tools::{Tool, ToolOutcome};
