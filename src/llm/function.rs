//! FunctionModel：由函数驱动的确定性后端（用于测试）
//!
//! 函数拿到完整历史与 AgentInfo，返回下一条 ModelResponse，可精确复现多轮工具调用序列，无需网络。

use async_trait::async_trait;

use crate::llm::{AgentInfo, LlmError, ModelGateway, ModelRequest};
use crate::memory::{Message, ModelResponse};

type ScriptFn =
    dyn Fn(&[Message], &AgentInfo<'_>) -> Result<ModelResponse, LlmError> + Send + Sync;

/// 脚本化模型：纯函数 (history, info) -> ModelResponse
pub struct FunctionModel {
    name: String,
    func: Box<ScriptFn>,
}

impl FunctionModel {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&[Message], &AgentInfo<'_>) -> ModelResponse + Send + Sync + 'static,
    {
        Self {
            name: "function".to_string(),
            func: boxed(move |messages, info| Ok(func(messages, info))),
        }
    }

    /// 可返回错误的版本（模拟网关故障）
    pub fn fallible<F>(func: F) -> Self
    where
        F: Fn(&[Message], &AgentInfo<'_>) -> Result<ModelResponse, LlmError> + Send + Sync + 'static,
    {
        Self {
            name: "function".to_string(),
            func: boxed(func),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

fn boxed<F>(func: F) -> Box<ScriptFn>
where
    F: Fn(&[Message], &AgentInfo<'_>) -> Result<ModelResponse, LlmError> + Send + Sync + 'static,
{
    Box::new(func)
}

#[async_trait]
impl ModelGateway for FunctionModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, LlmError> {
        (self.func)(request.messages, &request.info)
    }
}
