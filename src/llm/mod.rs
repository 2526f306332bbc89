//! 模型网关层：抽象与实现（OpenAI 兼容 / FunctionModel / TestModel）

pub mod function;
pub mod mock;
pub mod openai;
pub mod traits;

pub use function::FunctionModel;
pub use mock::{synthetic_arguments, CallTools, TestModel};
pub use openai::{OpenAiModel, TokenUsage};
pub use traits::{AgentInfo, LlmError, ModelGateway, ModelRequest, FINAL_RESULT_TOOL};
