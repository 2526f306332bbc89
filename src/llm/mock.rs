//! TestModel：按 schema 自动生成响应的后端（用于测试，无需 API）
//!
//! 第一次调用时对选中的工具各发起一次调用（参数按参数 schema 生成）；
//! 历史中出现工具结果后，按输出 schema 生成最终答案。只验证接线，不做任何推理。

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::llm::{LlmError, ModelGateway, ModelRequest};
use crate::memory::{Message, ModelResponse, Part};
use crate::schema::{FieldType, ObjectSchema};

/// 首轮调用哪些工具
#[derive(Debug, Clone, Default)]
pub enum CallTools {
    /// 全部已注册工具
    #[default]
    All,
    /// 仅指定名称的工具
    Only(Vec<String>),
    /// 不调用工具，直接给出最终答案
    None,
}

/// 按 schema 生成合法参数的合成模型
#[derive(Debug, Clone, Default)]
pub struct TestModel {
    call_tools: CallTools,
    custom_output: Option<Value>,
}

impl TestModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_tools(mut self, call_tools: CallTools) -> Self {
        self.call_tools = call_tools;
        self
    }

    /// 使用固定的最终答案参数，而不是按 schema 生成
    pub fn with_custom_output(mut self, output: Value) -> Self {
        self.custom_output = Some(output);
        self
    }

    fn selected<'a>(&self, request: &ModelRequest<'a>) -> Vec<&'a crate::tools::ToolDefinition> {
        let tools = request.info.tools;
        match &self.call_tools {
            CallTools::All => tools.iter().collect(),
            CallTools::Only(names) => tools.iter().filter(|t| names.contains(&t.name)).collect(),
            CallTools::None => Vec::new(),
        }
    }
}

/// 按 schema 生成参数：string -> "a"，integer -> 0，number -> 0.0，boolean -> false；可选字段同样生成
pub fn synthetic_arguments(schema: &ObjectSchema) -> Value {
    let mut out = Map::new();
    for field in &schema.fields {
        let value = match field.ty {
            FieldType::String => Value::from("a"),
            FieldType::Integer => Value::from(0),
            FieldType::Number => Value::from(0.0),
            FieldType::Boolean => Value::from(false),
        };
        out.insert(field.name.clone(), value);
    }
    Value::Object(out)
}

#[async_trait]
impl ModelGateway for TestModel {
    fn name(&self) -> &str {
        "test"
    }

    async fn next(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, LlmError> {
        let responded = request
            .messages
            .iter()
            .any(|m| matches!(m, Message::ModelResponse(_)));

        if !responded {
            let calls: Vec<Part> = self
                .selected(request)
                .into_iter()
                .map(|t| Part::tool_call(t.name.clone(), synthetic_arguments(&t.parameters)))
                .collect();
            if !calls.is_empty() {
                return Ok(ModelResponse::new(calls));
            }
        }

        let arguments = self
            .custom_output
            .clone()
            .unwrap_or_else(|| synthetic_arguments(request.info.output_schema));
        Ok(ModelResponse::new(vec![Part::final_answer(arguments)]))
    }
}
