//! 单次运行的对话历史
//!
//! Message / Part 描述模型与工具之间的往来；ConversationHistory 只允许追加，
//! 并保证每条 ToolResult / RetryPrompt 都对应此前一个尚未应答的调用（按 call_id）。

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

/// 生成调用 ID：call_<uuid>
pub fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// 模型响应中的一个片段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "part_kind", rename_all = "kebab-case")]
pub enum Part {
    /// 请求调用工具
    ToolCall {
        tool_name: String,
        call_id: String,
        arguments: Value,
    },
    /// 结构化最终答案
    FinalAnswer { call_id: String, arguments: Value },
    /// 纯文本（仅记录，不影响控制流）
    Text { content: String },
}

impl Part {
    pub fn tool_call(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self::tool_call_with_id(tool_name, new_call_id(), arguments)
    }

    pub fn tool_call_with_id(
        tool_name: impl Into<String>,
        call_id: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Part::ToolCall {
            tool_name: tool_name.into(),
            call_id: call_id.into(),
            arguments,
        }
    }

    pub fn final_answer(arguments: Value) -> Self {
        Part::FinalAnswer {
            call_id: new_call_id(),
            arguments,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Part::Text {
            content: content.into(),
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        match self {
            Part::ToolCall { call_id, .. } | Part::FinalAnswer { call_id, .. } => Some(call_id),
            Part::Text { .. } => None,
        }
    }
}

/// 模型的一次回复（零个或多个片段）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub parts: Vec<Part>,
}

impl ModelResponse {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolCall {
                tool_name,
                call_id,
                arguments,
            } => Some((tool_name.as_str(), call_id.as_str(), arguments)),
            _ => None,
        })
    }

    pub fn final_answers(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.parts.iter().filter_map(|p| match p {
            Part::FinalAnswer { call_id, arguments } => Some((call_id.as_str(), arguments)),
            _ => None,
        })
    }

    /// 所有文本片段拼接
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 历史中的一条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    UserPrompt {
        content: String,
    },
    ModelResponse(ModelResponse),
    ToolResult {
        tool_name: String,
        call_id: String,
        content: Value,
    },
    /// 工具或最终答案失败后反馈给模型的错误说明，供其自我修正
    RetryPrompt {
        tool_name: Option<String>,
        call_id: String,
        content: String,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::UserPrompt {
            content: content.into(),
        }
    }

    pub fn as_response(&self) -> Option<&ModelResponse> {
        match self {
            Message::ModelResponse(r) => Some(r),
            _ => None,
        }
    }

    /// ToolResult 的内容（其它消息返回 None）
    pub fn tool_content(&self) -> Option<&Value> {
        match self {
            Message::ToolResult { content, .. } => Some(content),
            _ => None,
        }
    }
}

/// 对话历史：只追加，归单次运行所有
#[derive(Debug, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
    /// 已发出但尚未应答的调用：call_id -> tool_name（最终答案为 None）
    pending: HashMap<String, Option<String>>,
    answered: HashSet<String>,
}

impl ConversationHistory {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 检查响应结构：最多一个最终答案；任何调用（含最终答案）的 call_id 不得与已登记或同批调用重复
    pub fn check_response(&self, response: &ModelResponse) -> Result<(), AgentError> {
        if response.final_answers().count() > 1 {
            return Err(AgentError::MalformedResponseError(
                "response contains more than one final answer".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for call_id in response.parts.iter().filter_map(Part::call_id) {
            if self.answered.contains(call_id) || self.pending.contains_key(call_id) {
                return Err(AgentError::MalformedResponseError(format!(
                    "call_id '{call_id}' reuses the id of an earlier call"
                )));
            }
            if !seen.insert(call_id) {
                return Err(AgentError::MalformedResponseError(format!(
                    "call_id '{call_id}' appears more than once in one response"
                )));
            }
        }
        Ok(())
    }

    /// 追加模型响应并登记其中的调用
    pub fn push_response(&mut self, response: ModelResponse) -> Result<(), AgentError> {
        self.check_response(&response)?;
        for part in &response.parts {
            match part {
                Part::ToolCall {
                    tool_name, call_id, ..
                } => {
                    self.pending.insert(call_id.clone(), Some(tool_name.clone()));
                }
                Part::FinalAnswer { call_id, .. } => {
                    self.pending.insert(call_id.clone(), None);
                }
                Part::Text { .. } => {}
            }
        }
        self.messages.push(Message::ModelResponse(response));
        Ok(())
    }

    pub fn push_tool_result(&mut self, call_id: &str, content: Value) -> Result<(), AgentError> {
        let tool_name = self.answer(call_id)?.ok_or_else(|| {
            AgentError::MalformedResponseError(format!("call '{call_id}' is not a tool call"))
        })?;
        self.messages.push(Message::ToolResult {
            tool_name,
            call_id: call_id.to_string(),
            content,
        });
        Ok(())
    }

    pub fn push_retry(&mut self, call_id: &str, content: impl Into<String>) -> Result<(), AgentError> {
        let tool_name = self.answer(call_id)?;
        self.messages.push(Message::RetryPrompt {
            tool_name,
            call_id: call_id.to_string(),
            content: content.into(),
        });
        Ok(())
    }

    fn answer(&mut self, call_id: &str) -> Result<Option<String>, AgentError> {
        let tool_name = self.pending.remove(call_id).ok_or_else(|| {
            AgentError::MalformedResponseError(format!("no pending call with id '{call_id}'"))
        })?;
        self.answered.insert(call_id.to_string());
        Ok(tool_name)
    }
}
