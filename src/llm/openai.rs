//! OpenAI 兼容 API 后端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url，例如本地 LM Studio）。
//! 工具以 function 形式发送；输出 schema 作为保留函数 final_result 发送，
//! 模型调用 final_result 即视为给出最终答案。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessage, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequestArgs, FunctionCall, FunctionObject,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::LlmSection;
use crate::llm::{AgentInfo, LlmError, ModelGateway, ModelRequest, FINAL_RESULT_TOOL};
use crate::memory::{Message, ModelResponse, Part};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    /// (prompt, completion, total)
    pub fn get(&self) -> (u64, u64, u64) {
        let prompt = self.prompt_tokens.load(Ordering::Relaxed);
        let completion = self.completion_tokens.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

/// OpenAI 兼容后端：持有 Client 与 model 名
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
    usage: TokenUsage,
}

impl OpenAiModel {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::default(),
        }
    }

    pub fn from_config(cfg: &LlmSection) -> Self {
        Self::new(cfg.base_url.as_deref(), &cfg.model, cfg.api_key.as_deref())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

}

/// 请求失败分类：密钥无效/未授权为 Auth，其余为 Transport
fn classify_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::ApiError(api) => {
            let is_auth = api.code.as_deref() == Some("invalid_api_key")
                || api.r#type.as_deref() == Some("authentication_error");
            if is_auth {
                LlmError::Auth(api.message)
            } else {
                LlmError::Transport(api.to_string())
            }
        }
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidResponse(msg),
        other => LlmError::Transport(other.to_string()),
    }
}

fn to_openai_tools(info: &AgentInfo<'_>) -> Vec<ChatCompletionTools> {
    let mut tools: Vec<ChatCompletionTools> = info
        .tools
        .iter()
        .map(|t| {
            ChatCompletionTools::Function(ChatCompletionTool {
                function: FunctionObject {
                    name: t.name.clone(),
                    description: Some(t.description.clone()),
                    parameters: Some(t.parameters_json()),
                    ..Default::default()
                },
            })
        })
        .collect();
    let description = info
        .output_schema
        .description
        .clone()
        .unwrap_or_else(|| "The final response which ends this conversation".to_string());
    tools.push(ChatCompletionTools::Function(ChatCompletionTool {
        function: FunctionObject {
            name: FINAL_RESULT_TOOL.to_string(),
            description: Some(description),
            parameters: Some(info.output_schema.to_json_schema()),
            ..Default::default()
        },
    }));
    tools
}

fn to_openai_messages(
    system: Option<&str>,
    messages: &[Message],
) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    let build_err = |e: async_openai::error::OpenAIError| LlmError::InvalidResponse(e.to_string());
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        out.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessage::from(system),
        ));
    }
    for m in messages {
        match m {
            Message::UserPrompt { content } => out.push(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage::from(content.as_str()),
            )),
            Message::ModelResponse(response) => {
                let tool_calls: Vec<ChatCompletionMessageToolCalls> = response
                    .parts
                    .iter()
                    .filter_map(|p| {
                        let (name, call_id, arguments) = match p {
                            Part::ToolCall {
                                tool_name,
                                call_id,
                                arguments,
                            } => (tool_name.as_str(), call_id, arguments),
                            Part::FinalAnswer { call_id, arguments } => {
                                (FINAL_RESULT_TOOL, call_id, arguments)
                            }
                            Part::Text { .. } => return None,
                        };
                        Some(ChatCompletionMessageToolCalls::Function(
                            ChatCompletionMessageToolCall {
                                id: call_id.clone(),
                                function: FunctionCall {
                                    name: name.to_string(),
                                    arguments: arguments.to_string(),
                                },
                            },
                        ))
                    })
                    .collect();
                let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                let text = response.text();
                if !text.is_empty() {
                    args.content(text);
                }
                if !tool_calls.is_empty() {
                    args.tool_calls(tool_calls);
                }
                out.push(ChatCompletionRequestMessage::Assistant(
                    args.build().map_err(build_err)?,
                ));
            }
            Message::ToolResult {
                call_id, content, ..
            } => out.push(ChatCompletionRequestMessage::Tool(
                ChatCompletionRequestToolMessageArgs::default()
                    .content(content.to_string())
                    .tool_call_id(call_id.clone())
                    .build()
                    .map_err(build_err)?,
            )),
            Message::RetryPrompt {
                call_id, content, ..
            } => out.push(ChatCompletionRequestMessage::Tool(
                ChatCompletionRequestToolMessageArgs::default()
                    .content(content.clone())
                    .tool_call_id(call_id.clone())
                    .build()
                    .map_err(build_err)?,
            )),
        }
    }
    Ok(out)
}

/// 解析函数参数；非法 JSON 原样包成字符串，交由 schema 校验报告错误
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[async_trait]
impl ModelGateway for OpenAiModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn is_live(&self) -> bool {
        true
    }

    async fn next(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, LlmError> {
        let messages = to_openai_messages(request.info.system_prompt, request.messages)?;
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .tools(to_openai_tools(&request.info))
            .build()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(classify_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
            let (prompt, completion, total) = self.usage.get();
            tracing::debug!(prompt, completion, total, "token usage");
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices returned".to_string()))?;

        let mut parts = Vec::new();
        if let Some(content) = choice.message.content.filter(|c| !c.trim().is_empty()) {
            parts.push(Part::text(content));
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            let ChatCompletionMessageToolCalls::Function(f) = call else {
                continue;
            };
            let arguments = parse_arguments(&f.function.arguments);
            if f.function.name == FINAL_RESULT_TOOL {
                parts.push(Part::FinalAnswer {
                    call_id: f.id,
                    arguments,
                });
            } else {
                parts.push(Part::ToolCall {
                    tool_name: f.function.name,
                    call_id: f.id,
                    arguments,
                });
            }
        }
        tracing::debug!(model = %self.model, parts = parts.len(), "model response");
        Ok(ModelResponse::new(parts))
    }
}
