//! 首都查询示例：Capital 输出类型、SQLite 数据源、query_numbers 工具与依赖容器
//!
//! 模型先调用 query_numbers 取得人口与面积，再以 Capital 结构给出最终答案。

mod store;
mod tool;

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use store::{CapitalNumbers, CapitalStore, DataSourceError};
pub use tool::QueryNumbersTool;

use crate::agent::Agent;
use crate::core::AgentError;
use crate::llm::ModelGateway;

/// 默认提示词
pub const DEFAULT_PROMPT: &str = "What is the size of the capital of Germany?";

/// 首都信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Capital {
    /// name of the capital
    pub name: String,
    /// the country of the capital as it was asked by the user
    pub country: String,
    /// number of inhabitants
    pub num_inhabitants: f64,
    /// size of the capital in km²
    pub size_of_capital: f64,
}

/// 每次运行传入的依赖
#[derive(Clone)]
pub struct CapitalDeps {
    pub store: CapitalStore,
}

impl CapitalDeps {
    pub fn new(store: CapitalStore) -> Self {
        Self { store }
    }
}

/// 构建首都查询 Agent（输出 Capital，注册 query_numbers）
pub fn capital_agent(model: Arc<dyn ModelGateway>) -> Result<Agent<CapitalDeps, Capital>, AgentError> {
    Agent::<CapitalDeps, Capital>::builder("capitals")
        .typed_output()?
        .tool(QueryNumbersTool)?
        .model(model)
        .build()
}
