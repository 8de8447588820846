pub mod store;
pub mod types;

pub use store::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
pub use types::DetectionTask;
