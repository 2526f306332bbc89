//! 运行过程事件：用于向调用方推送步数、工具调用、工具结果、重试与最终答案

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 步数更新（当前第几步，从 0 开始）
    StepUpdate { step: usize, max_steps: usize },
    /// 正在请求模型
    Thinking { gateway: String },
    /// 模型附带的文本
    Text { text: String },
    /// 调用工具
    ToolCall {
        tool: String,
        call_id: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    ToolResult {
        tool: String,
        call_id: String,
        preview: String,
    },
    /// 失败已反馈给模型，继续循环
    Retry { call_id: String, reason: String },
    /// 最终答案校验通过
    FinalAnswer { call_id: String },
    /// 运行以错误结束
    Error { text: String },
}
