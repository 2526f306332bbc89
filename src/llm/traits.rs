//! 模型网关抽象
//!
//! 所有后端（OpenAI 兼容 / FunctionModel / TestModel）实现 ModelGateway：
//! 给定对话历史、可用工具与输出 schema，返回下一条 ModelResponse。
//! 超时与取消由编排循环统一施加，后端无需关心。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::{Message, ModelResponse};
use crate::schema::ObjectSchema;
use crate::tools::ToolDefinition;

/// 保留的最终答案工具名：输出 schema 以此名义作为一个函数暴露给模型
pub const FINAL_RESULT_TOOL: &str = "final_result";

/// 网关层错误；转换为 AgentError 时传输/鉴权类映射为 ModelUnavailable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("model requests are disabled for this run (gateway '{0}')")]
    RequestsDisabled(String),
}

/// 本次运行的静态元信息（对一次运行的所有请求都相同）
#[derive(Debug, Clone, Copy)]
pub struct AgentInfo<'a> {
    pub tools: &'a [ToolDefinition],
    pub output_schema: &'a ObjectSchema,
    pub system_prompt: Option<&'a str>,
}

impl<'a> AgentInfo<'a> {
    pub fn tool(&self, name: &str) -> Option<&'a ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// 一次网关请求：历史 + 元信息
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub messages: &'a [Message],
    pub info: AgentInfo<'a>,
}

/// 模型网关 trait
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// 后端名称（日志用）
    fn name(&self) -> &str;

    /// 是否会发起真实网络请求；运行配置 allow_model_requests = false 时拒绝此类后端
    fn is_live(&self) -> bool {
        false
    }

    /// 根据历史生成下一条响应
    async fn next(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, LlmError>;
}
