//! 编排主循环
//!
//! 请求模型 -> 追加响应 -> 执行工具调用并写回结果 -> 若有最终答案则校验并返回；
//! 支持取消、模型/工具独立超时、最大步数限制，以及按类别开启的失败重试。
//! 可选 event_tx：向调用方推送 StepUpdate / ToolCall / ToolResult / Retry / FinalAnswer。

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, RecoveryAction, RecoveryPolicy};
use crate::llm::{AgentInfo, ModelGateway, ModelRequest};
use crate::memory::{ConversationHistory, Message, ModelResponse};
use crate::react::RunEvent;
use crate::schema::{validate, ObjectSchema, ValidatedValue};
use crate::tools::executor::json_preview;
use crate::tools::{ToolExecutor, ToolRegistry};

/// 单次运行的数值配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub max_steps: usize,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub allow_model_requests: bool,
    pub recovery: RecoveryPolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_steps: 10,
            model_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
            allow_model_requests: true,
            recovery: RecoveryPolicy::default(),
        }
    }
}

/// 一次运行所需的全部组件（只读借用，可被多个并发运行共享）
pub struct RunSession<'a, D> {
    pub model: &'a dyn ModelGateway,
    pub tools: &'a ToolRegistry<D>,
    pub output_schema: &'a ObjectSchema,
    pub system_prompt: Option<&'a str>,
    pub settings: RunSettings,
    pub cancel_token: CancellationToken,
    pub event_tx: Option<&'a mpsc::UnboundedSender<RunEvent>>,
}

/// 循环成功结束：校验后的最终答案、完整历史、实际步数
#[derive(Debug)]
pub struct LoopOutcome {
    pub value: ValidatedValue,
    pub messages: Vec<Message>,
    pub steps: usize,
}

fn send_event(tx: Option<&mpsc::UnboundedSender<RunEvent>>, ev: RunEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 执行一次完整运行，返回最终答案或唯一的错误
pub async fn run_loop<D: Send + Sync + 'static>(
    session: &RunSession<'_, D>,
    prompt: &str,
    deps: &D,
) -> Result<LoopOutcome, AgentError> {
    let result = run_loop_impl(session, prompt, deps).await;
    match &result {
        Ok(outcome) => tracing::info!(
            gateway = session.model.name(),
            steps = outcome.steps,
            messages = outcome.messages.len(),
            "run finished"
        ),
        Err(e) => {
            tracing::warn!(gateway = session.model.name(), error = %e, "run failed");
            send_event(session.event_tx, RunEvent::Error { text: e.to_string() });
        }
    }
    result
}

async fn run_loop_impl<D: Send + Sync + 'static>(
    session: &RunSession<'_, D>,
    prompt: &str,
    deps: &D,
) -> Result<LoopOutcome, AgentError> {
    let settings = &session.settings;
    if session.model.is_live() && !settings.allow_model_requests {
        return Err(crate::llm::LlmError::RequestsDisabled(session.model.name().to_string()).into());
    }

    let definitions = session.tools.definitions();
    let info = AgentInfo {
        tools: &definitions,
        output_schema: session.output_schema,
        system_prompt: session.system_prompt,
    };
    let executor = ToolExecutor::new(session.tools, settings.tool_timeout);
    let cancel = &session.cancel_token;

    let mut history = ConversationHistory::new(prompt);
    let mut retries = 0usize;

    for step in 0..settings.max_steps {
        send_event(
            session.event_tx,
            RunEvent::StepUpdate {
                step,
                max_steps: settings.max_steps,
            },
        );
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        send_event(
            session.event_tx,
            RunEvent::Thinking {
                gateway: session.model.name().to_string(),
            },
        );
        let response = request_model(session, &history, info, cancel).await?;
        tracing::info!(step, parts = response.parts.len(), "model step");
        history.push_response(response.clone())?;
        tracing::debug!(history = history.len(), "history size");

        let text = response.text();
        if !text.is_empty() {
            send_event(session.event_tx, RunEvent::Text { text });
        }

        // 整批调用在执行前先检查工具是否存在，未知工具直接终止
        if let Some((name, _, _)) = response
            .tool_calls()
            .find(|(name, _, _)| !session.tools.contains(name))
        {
            return Err(AgentError::UnknownTool(name.to_string()));
        }

        let mut has_tool_calls = false;
        for (tool_name, call_id, args) in response.tool_calls() {
            has_tool_calls = true;
            send_event(
                session.event_tx,
                RunEvent::ToolCall {
                    tool: tool_name.to_string(),
                    call_id: call_id.to_string(),
                    args: args.clone(),
                },
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                r = executor.execute(tool_name, call_id, deps, args) => r,
            };

            match result {
                Ok(payload) => {
                    let content = Value::Object(payload);
                    send_event(
                        session.event_tx,
                        RunEvent::ToolResult {
                            tool: tool_name.to_string(),
                            call_id: call_id.to_string(),
                            preview: json_preview(&content),
                        },
                    );
                    history.push_tool_result(call_id, content)?;
                }
                Err(e) => handle_failure(session, &mut history, &mut retries, call_id, e)?,
            }
        }

        match response.final_answers().next() {
            Some((call_id, args)) => match validate(session.output_schema, args) {
                Ok(value) => {
                    send_event(
                        session.event_tx,
                        RunEvent::FinalAnswer {
                            call_id: call_id.to_string(),
                        },
                    );
                    return Ok(LoopOutcome {
                        value,
                        messages: history.into_messages(),
                        steps: step + 1,
                    });
                }
                Err(failure) => handle_failure(
                    session,
                    &mut history,
                    &mut retries,
                    call_id,
                    AgentError::SchemaValidationError(failure),
                )?,
            },
            None if !has_tool_calls => return Err(AgentError::EmptyResponseError),
            None => {}
        };
    }

    Err(AgentError::StepLimitExceeded(settings.max_steps))
}

/// 请求模型：与取消信号竞争，并施加单次调用超时
async fn request_model<D>(
    session: &RunSession<'_, D>,
    history: &ConversationHistory,
    info: AgentInfo<'_>,
    cancel: &CancellationToken,
) -> Result<ModelResponse, AgentError> {
    let request = ModelRequest {
        messages: history.messages(),
        info,
    };
    let limit = session.settings.model_timeout;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        r = timeout(limit, session.model.next(&request)) => match r {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(AgentError::ModelTimeout(limit)),
        },
    }
}

/// 按恢复策略处理失败：重试则写入 RetryPrompt 并继续，否则原样返回错误
fn handle_failure<D>(
    session: &RunSession<'_, D>,
    history: &mut ConversationHistory,
    retries: &mut usize,
    call_id: &str,
    err: AgentError,
) -> Result<(), AgentError> {
    match session.settings.recovery.handle(&err, *retries) {
        RecoveryAction::RetryWithPrompt(prompt) => {
            *retries += 1;
            tracing::warn!(call_id, retries = *retries, error = %err, "feeding failure back to model");
            send_event(
                session.event_tx,
                RunEvent::Retry {
                    call_id: call_id.to_string(),
                    reason: err.to_string(),
                },
            );
            history.push_retry(call_id, prompt)
        }
        RecoveryAction::Abort => Err(err),
    }
}
