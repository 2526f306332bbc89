//! Agent 构建器：统一的 Agent 初始化逻辑
//!
//! 注册工具、设定输出 schema、选择模型网关与默认运行参数，build 后得到只读的 Agent。

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::agent::Agent;
use crate::config::AppConfig;
use crate::core::{AgentError, RecoveryPolicy};
use crate::llm::{ModelGateway, OpenAiModel, TestModel};
use crate::react::RunSettings;
use crate::schema::ObjectSchema;
use crate::tools::{Tool, ToolRegistry};

/// Agent 构建器
pub struct AgentBuilder<D, O> {
    name: String,
    tools: ToolRegistry<D>,
    output_schema: Option<ObjectSchema>,
    model: Option<Arc<dyn ModelGateway>>,
    system_prompt: Option<String>,
    settings: RunSettings,
    _output: PhantomData<fn() -> O>,
}

impl<D: Send + Sync + 'static, O: DeserializeOwned> AgentBuilder<D, O> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: ToolRegistry::new(),
            output_schema: None,
            model: None,
            system_prompt: None,
            settings: RunSettings::default(),
            _output: PhantomData,
        }
    }

    /// 注册工具；重名返回 DuplicateTool
    pub fn tool(mut self, tool: impl Tool<D> + 'static) -> Result<Self, AgentError> {
        self.tools.register(tool)?;
        Ok(self)
    }

    /// 使用已构建好的注册表（替换之前注册的工具）
    pub fn tools(mut self, tools: ToolRegistry<D>) -> Self {
        self.tools = tools;
        self
    }

    /// 显式指定输出 schema
    pub fn output_schema(mut self, schema: ObjectSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn model(mut self, model: Arc<dyn ModelGateway>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.settings.max_steps = max_steps;
        self
    }

    pub fn model_timeout(mut self, timeout: Duration) -> Self {
        self.settings.model_timeout = timeout;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.settings.tool_timeout = timeout;
        self
    }

    pub fn allow_model_requests(mut self, allow: bool) -> Self {
        self.settings.allow_model_requests = allow;
        self
    }

    pub fn recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.settings.recovery = recovery;
        self
    }

    /// 从 [agent]/[llm]/[tools] 段读取默认运行参数与系统提示词
    pub fn with_config(mut self, cfg: &AppConfig) -> Self {
        self.settings = RunSettings {
            max_steps: cfg.agent.max_steps,
            model_timeout: cfg.model_timeout(),
            tool_timeout: cfg.tool_timeout(),
            allow_model_requests: cfg.agent.allow_model_requests,
            recovery: cfg.agent.recovery_policy(),
        };
        if let Some(prompt) = &cfg.agent.system_prompt {
            self.system_prompt = Some(prompt.clone());
        }
        self
    }

    pub fn build(self) -> Result<Agent<D, O>, AgentError> {
        let output_schema = self
            .output_schema
            .ok_or_else(|| AgentError::ConfigError(format!("agent '{}' has no output schema", self.name)))?;
        let model = self
            .model
            .ok_or_else(|| AgentError::ConfigError(format!("agent '{}' has no model", self.name)))?;
        if self.settings.max_steps == 0 {
            return Err(AgentError::ConfigError("max_steps must be at least 1".to_string()));
        }

        tracing::info!(
            agent = %self.name,
            gateway = model.name(),
            tools = ?self.tools.tool_names(),
            output = %output_schema.name,
            "agent built"
        );
        Ok(Agent::from_parts(
            self.name,
            self.tools,
            output_schema,
            model,
            self.system_prompt,
            self.settings,
        ))
    }
}

impl<D: Send + Sync + 'static, O: DeserializeOwned + JsonSchema> AgentBuilder<D, O> {
    /// 由输出类型 O 的 JsonSchema 推导输出 schema
    pub fn typed_output(self) -> Result<Self, AgentError> {
        let schema = ObjectSchema::from_type::<O>()?;
        Ok(self.output_schema(schema))
    }
}

/// 按配置创建模型网关：允许真实请求时使用 OpenAI 兼容端点，否则退回 TestModel
pub fn create_model_from_config(cfg: &AppConfig) -> Arc<dyn ModelGateway> {
    if cfg.agent.allow_model_requests {
        tracing::info!(
            model = %cfg.llm.model,
            base_url = cfg.llm.base_url.as_deref().unwrap_or("default"),
            "Using OpenAI-compatible model"
        );
        Arc::new(OpenAiModel::from_config(&cfg.llm))
    } else {
        tracing::warn!("Model requests disabled, using TestModel");
        Arc::new(TestModel::new())
    }
}
