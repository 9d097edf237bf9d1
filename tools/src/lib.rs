pub mod batches;
pub mod config;

pub use batches::{read_batches, BatchRecord, BatchTensors};
pub use config::ToolConfig;
