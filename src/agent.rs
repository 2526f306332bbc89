//! Agent 运行时
//!
//! Agent 把注册表、输出 schema、默认模型网关与默认运行参数打包在一起（配置一次，之后只读）；
//! run 对单条提示跑编排循环并返回强类型结果，run_sync 为阻塞版本。
//! RunOptions 可在单次运行中替换模型网关、超时、步数与取消令牌，而不影响注册表与 schema。

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::{AgentBuilder, AgentError, RecoveryPolicy};
use crate::llm::ModelGateway;
use crate::memory::Message;
use crate::react::{run_loop, RunEvent, RunSession, RunSettings};
use crate::schema::{ObjectSchema, ValidatedValue};
use crate::tools::ToolRegistry;

/// 运行结果：成功值或唯一的错误
pub type RunResult<O> = Result<RunOutput<O>, AgentError>;

/// 成功运行的输出
#[derive(Debug, Clone)]
pub struct RunOutput<O> {
    /// 反序列化后的强类型最终答案
    pub output: O,
    /// 校验后的字段值
    pub value: ValidatedValue,
    /// 完整对话历史
    pub messages: Vec<Message>,
    /// 实际调用模型的次数
    pub steps: usize,
}

/// 单次运行的覆盖项；未设置的项使用 Agent 的默认值
#[derive(Clone, Default)]
pub struct RunOptions {
    max_steps: Option<usize>,
    model_timeout: Option<Duration>,
    tool_timeout: Option<Duration>,
    allow_model_requests: Option<bool>,
    recovery: Option<RecoveryPolicy>,
    model: Option<Arc<dyn ModelGateway>>,
    cancel_token: Option<CancellationToken>,
    event_tx: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = Some(timeout);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// 关闭后，真实网络后端会在发出任何请求前以 ModelUnavailable 失败
    pub fn allow_model_requests(mut self, allow: bool) -> Self {
        self.allow_model_requests = Some(allow);
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// 本次运行替换模型网关（测试替身等）
    pub fn with_model(mut self, model: Arc<dyn ModelGateway>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn resolve(&self, defaults: RunSettings) -> RunSettings {
        RunSettings {
            max_steps: self.max_steps.unwrap_or(defaults.max_steps),
            model_timeout: self.model_timeout.unwrap_or(defaults.model_timeout),
            tool_timeout: self.tool_timeout.unwrap_or(defaults.tool_timeout),
            allow_model_requests: self
                .allow_model_requests
                .unwrap_or(defaults.allow_model_requests),
            recovery: self.recovery.unwrap_or(defaults.recovery),
        }
    }
}

/// 已配置的 Agent：D 为依赖类型，O 为最终答案类型
pub struct Agent<D, O> {
    name: String,
    tools: Arc<ToolRegistry<D>>,
    output_schema: Arc<ObjectSchema>,
    model: Arc<dyn ModelGateway>,
    system_prompt: Option<Arc<str>>,
    settings: RunSettings,
    _output: PhantomData<fn() -> O>,
}

impl<D, O> Clone for Agent<D, O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tools: self.tools.clone(),
            output_schema: self.output_schema.clone(),
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            settings: self.settings,
            _output: PhantomData,
        }
    }
}

impl<D: Send + Sync + 'static, O: DeserializeOwned> Agent<D, O> {
    pub fn builder(name: impl Into<String>) -> AgentBuilder<D, O> {
        AgentBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        tools: ToolRegistry<D>,
        output_schema: ObjectSchema,
        model: Arc<dyn ModelGateway>,
        system_prompt: Option<String>,
        settings: RunSettings,
    ) -> Self {
        Self {
            name,
            tools: Arc::new(tools),
            output_schema: Arc::new(output_schema),
            model,
            system_prompt: system_prompt.map(Arc::from),
            settings,
            _output: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &ToolRegistry<D> {
        &self.tools
    }

    pub fn output_schema(&self) -> &ObjectSchema {
        &self.output_schema
    }

    pub fn model(&self) -> &Arc<dyn ModelGateway> {
        &self.model
    }

    pub fn settings(&self) -> RunSettings {
        self.settings
    }

    /// 换一个默认模型网关；注册表与 schema 与原 Agent 共享
    pub fn with_model(&self, model: Arc<dyn ModelGateway>) -> Self {
        Self {
            model,
            ..self.clone()
        }
    }

    /// 异步运行（可通过 RunOptions::with_cancel_token 取消）
    pub async fn run(&self, prompt: &str, deps: &D, options: RunOptions) -> RunResult<O> {
        let model = options.model.clone().unwrap_or_else(|| self.model.clone());
        let session = RunSession {
            model: model.as_ref(),
            tools: &self.tools,
            output_schema: &self.output_schema,
            system_prompt: self.system_prompt.as_deref(),
            settings: options.resolve(self.settings),
            cancel_token: options.cancel_token.clone().unwrap_or_default(),
            event_tx: options.event_tx.as_ref(),
        };

        let span = tracing::info_span!("agent_run", agent = %self.name, gateway = model.name());
        let outcome = run_loop(&session, prompt, deps).instrument(span).await?;
        let output = outcome
            .value
            .deserialize::<O>()
            .map_err(AgentError::SchemaValidationError)?;

        Ok(RunOutput {
            output,
            value: outcome.value,
            messages: outcome.messages,
            steps: outcome.steps,
        })
    }

    /// 阻塞运行：内部创建单线程 runtime；在 tokio runtime 内调用时返回 Runtime 错误
    pub fn run_sync(&self, prompt: &str, deps: &D, options: RunOptions) -> RunResult<O> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(AgentError::Runtime(
                "run_sync called inside a tokio runtime; use run().await instead".to_string(),
            ));
        }
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AgentError::Runtime(e.to_string()))?;
        rt.block_on(self.run(prompt, deps, options))
    }
}
