pub mod executor;
pub mod registry;

pub use executor::ToolExecutor;
pub use registry::{Tool, ToolDefinition, ToolPayload, ToolRegistry};
