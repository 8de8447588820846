pub mod context;
pub mod engine;
pub mod state;
pub mod steps;

pub use context::{CancelHandle, RunContext};
pub use engine::{Pipeline, PipelineBuilder, PipelineOutcome, Step};
pub use state::{ExecutionState, StateUpdate, StepError};
pub use steps::{
    DetectAnomaliesStep, LoadDataStep, RecoveryPolicy, SummarizeStep, DETECT_ANOMALIES, LOAD_DATA,
    SUMMARIZE,
};
