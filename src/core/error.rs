//! Agent 错误类型与恢复动作
//!
//! 一次运行只返回一个结果：成功值，或下列某一种错误。
//! 与 RecoveryPolicy 配合：可恢复的错误可作为 RetryPrompt 反馈给模型，其余直接终止。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;
use crate::schema::ValidationFailure;

/// 运行过程中可能出现的错误（模型、工具、响应结构、校验、取消等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model timeout after {0:?}")]
    ModelTimeout(Duration),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for tool '{tool}': {failure}")]
    InvalidArguments {
        tool: String,
        failure: ValidationFailure,
    },

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecutionError { tool: String, message: String },

    #[error("Tool '{tool}' timed out after {timeout:?}")]
    ToolTimeout { tool: String, timeout: Duration },

    #[error("Malformed model response: {0}")]
    MalformedResponseError(String),

    #[error("Final answer failed validation: {0}")]
    SchemaValidationError(ValidationFailure),

    #[error("Model response contained neither tool calls nor a final answer")]
    EmptyResponseError,

    #[error("Step limit exceeded ({0} steps)")]
    StepLimitExceeded(usize),

    #[error("Cancelled")]
    Cancelled,

    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::InvalidResponse(msg) => AgentError::MalformedResponseError(msg),
            other => AgentError::ModelUnavailable(other.to_string()),
        }
    }
}

/// 恢复策略根据错误给出的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 将错误说明作为 RetryPrompt 写回历史，让模型重试
    RetryWithPrompt(String),
    /// 终止当前运行
    Abort,
}
