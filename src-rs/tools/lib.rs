pub mod http;
pub mod mock;
pub mod registry;
pub mod retry;
pub mod types;

pub use http::{HttpAnomalyDetectionTool, HttpToolConfig};
pub use mock::MockAnomalyDetectionTool;
pub use registry::{ToolRegistry, ToolSelection, ToolSelector, HTTP_TOOL, MOCK_TOOL};
pub use retry::RetryPolicy;
pub use types::{Tool, ToolOutcome};
