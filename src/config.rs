//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TYPED_AGENT__*` 覆盖（双下划线表示嵌套，如 `TYPED_AGENT__LLM__MODEL=qwen`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{FailurePolicy, RecoveryPolicy};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub data: DataSection,
}

/// [llm] 段：OpenAI 兼容端点、模型与请求超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: Option<String>,
    pub model: String,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
    /// 单次模型调用超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: Some("http://127.0.0.1:1234/v1".to_string()),
            model: "openai/gpt-oss-20b".to_string(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [agent] 段：步数上限、是否允许真实模型请求、失败重试策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_steps: usize,
    pub allow_model_requests: bool,
    pub system_prompt: Option<String>,
    pub max_retries: usize,
    pub on_tool_error: FailurePolicy,
    pub on_invalid_arguments: FailurePolicy,
    pub on_validation_error: FailurePolicy,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 10,
            allow_model_requests: true,
            system_prompt: None,
            max_retries: 1,
            on_tool_error: FailurePolicy::Terminate,
            on_invalid_arguments: FailurePolicy::Terminate,
            on_validation_error: FailurePolicy::Terminate,
        }
    }
}

impl AgentSection {
    pub fn recovery_policy(&self) -> RecoveryPolicy {
        RecoveryPolicy {
            tool_errors: self.on_tool_error,
            invalid_arguments: self.on_invalid_arguments,
            validation_errors: self.on_validation_error,
            max_retries: self.max_retries,
        }
    }
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// [data] 段：首都数据库（SQLite 文件），未设置时使用内存示例数据
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub database: Option<PathBuf>,
}

impl AppConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.request_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.tool_timeout_secs)
    }
}

/// 从 config 目录加载配置，环境变量 TYPED_AGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TYPED_AGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TYPED_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
