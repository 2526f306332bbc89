//! 工具注册表
//!
//! 所有工具实现 Tool<D> trait（name / description / parameters / execute），由 ToolRegistry 按名注册与查找。
//! 依赖 D 不由注册表保存，而是在每次调用时由编排循环传入，同一注册表可服务多个使用不同依赖的运行。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::schema::{validate, ObjectSchema, ValidatedValue};

/// 工具返回值：JSON 对象（可由 returns() 声明各字段类型）
pub type ToolPayload = Map<String, Value>;

/// 工具 trait：名称、描述（供模型理解）、参数 schema、可选返回 schema、异步执行
#[async_trait]
pub trait Tool<D>: Send + Sync {
    /// 工具名称（模型调用时使用）
    fn name(&self) -> &str;

    /// 工具描述（供模型理解功能）
    fn description(&self) -> &str;

    /// 参数 schema；调用前会先校验，校验失败不会进入 execute
    fn parameters(&self) -> ObjectSchema {
        ObjectSchema::empty()
    }

    /// 返回值 schema；声明后，返回的 payload 会在注册表边界校验
    fn returns(&self) -> Option<ObjectSchema> {
        None
    }

    /// 执行工具：deps 为本次运行的依赖，args 已按 parameters() 校验并转换
    async fn execute(&self, deps: &D, args: ValidatedValue) -> Result<ToolPayload, String>;
}

/// 发给模型的工具定义
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ObjectSchema,
}

impl ToolDefinition {
    /// 参数 JSON Schema
    pub fn parameters_json(&self) -> Value {
        self.parameters.to_json_schema()
    }
}

struct RegisteredTool<D> {
    tool: Arc<dyn Tool<D>>,
    parameters: ObjectSchema,
    returns: Option<ObjectSchema>,
}

/// 工具注册表：按名称存储 Arc<dyn Tool<D>>；名称唯一，schema 在注册时固定
pub struct ToolRegistry<D> {
    tools: HashMap<String, RegisteredTool<D>>,
}

impl<D> Default for ToolRegistry<D> {
    fn default() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }
}

impl<D: Send + Sync + 'static> ToolRegistry<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；重名返回 DuplicateTool
    pub fn register(&mut self, tool: impl Tool<D> + 'static) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        let parameters = tool.parameters();
        let returns = tool.returns();
        self.tools.insert(
            name,
            RegisteredTool {
                tool: Arc::new(tool),
                parameters,
                returns,
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 工具定义列表（按名称排序，保证每次请求顺序稳定）
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .iter()
            .map(|(name, t)| ToolDefinition {
                name: name.clone(),
                description: t.tool.description().to_string(),
                parameters: t.parameters.clone(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// 校验参数 -> 调用工具 -> 校验返回值
    pub async fn invoke(&self, name: &str, deps: &D, args: &Value) -> Result<ToolPayload, AgentError> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;

        let validated =
            validate(&entry.parameters, args).map_err(|failure| AgentError::InvalidArguments {
                tool: name.to_string(),
                failure,
            })?;

        let payload = entry
            .tool
            .execute(deps, validated)
            .await
            .map_err(|message| AgentError::ToolExecutionError {
                tool: name.to_string(),
                message,
            })?;

        match &entry.returns {
            Some(schema) => validate(schema, &Value::Object(payload))
                .map(ValidatedValue::into_map)
                .map_err(|failure| AgentError::ToolExecutionError {
                    tool: name.to_string(),
                    message: format!("invalid return payload: {failure}"),
                }),
            None => Ok(payload),
        }
    }
}
