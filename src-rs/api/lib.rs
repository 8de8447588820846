pub mod handlers;
pub mod middleware;
pub mod server;

pub use handlers::{AppState, ErrorBody};
pub use middleware::TraceId;
pub use server::{build_router, DetectionServer};
