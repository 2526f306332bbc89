//! 核心层：错误类型、恢复策略、Agent 构建器

pub mod builder;
pub mod error;
pub mod recovery;

pub use builder::{create_model_from_config, AgentBuilder};
pub use error::{AgentError, RecoveryAction};
pub use recovery::{FailurePolicy, RecoveryPolicy};
