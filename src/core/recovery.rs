//! 错误恢复策略
//!
//! 默认所有失败都终止运行。可按失败类别（工具执行失败 / 工具参数无效 / 最终答案校验失败）
//! 单独开启重试：错误作为 RetryPrompt 反馈给模型，重试次数受 max_retries 限制。
//! 同一次运行内，同一类别只会采用一种处理方式。

use serde::Deserialize;

use crate::core::{AgentError, RecoveryAction};

/// 单个失败类别的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 立即终止并返回该错误
    #[default]
    Terminate,
    /// 反馈给模型，继续循环
    Retry,
}

/// 按失败类别的恢复策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub tool_errors: FailurePolicy,
    pub invalid_arguments: FailurePolicy,
    pub validation_errors: FailurePolicy,
    /// 单次运行内允许的重试总次数
    pub max_retries: usize,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            tool_errors: FailurePolicy::Terminate,
            invalid_arguments: FailurePolicy::Terminate,
            validation_errors: FailurePolicy::Terminate,
            max_retries: 1,
        }
    }
}

impl RecoveryPolicy {
    /// 所有可恢复类别都开启重试
    pub fn retry_all(max_retries: usize) -> Self {
        Self {
            tool_errors: FailurePolicy::Retry,
            invalid_arguments: FailurePolicy::Retry,
            validation_errors: FailurePolicy::Retry,
            max_retries,
        }
    }

    /// 根据错误与已用重试次数返回动作；未知工具、超时、模型故障等永远终止
    pub fn handle(&self, err: &AgentError, retries_used: usize) -> RecoveryAction {
        let policy = match err {
            AgentError::ToolExecutionError { .. } => self.tool_errors,
            AgentError::InvalidArguments { .. } => self.invalid_arguments,
            AgentError::SchemaValidationError(_) => self.validation_errors,
            _ => FailurePolicy::Terminate,
        };
        if policy == FailurePolicy::Retry && retries_used < self.max_retries {
            RecoveryAction::RetryWithPrompt(format!("{err}\n\nFix the errors and try again."))
        } else {
            RecoveryAction::Abort
        }
    }
}
