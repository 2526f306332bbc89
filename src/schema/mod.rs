//! 结构化 Schema：字段声明、校验与类型推导
//!
//! ObjectSchema 同时用于三处：最终答案（输出 schema）、工具参数、工具返回值。
//! validate 负责校验并做确定性的数值转换；from_type 从 schemars::JsonSchema 推导字段。

mod derive;
mod validate;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use validate::validate;

/// 字段的基本类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldType {
    /// JSON Schema 中的 type 名
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个字段：名称、类型、是否必填、描述（描述会发给模型）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
    pub description: Option<String>,
}

impl FieldSchema {
    pub fn required(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 对象 Schema：有序字段列表 + 是否允许未声明字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub allow_extra: bool,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: Vec::new(),
            allow_extra: false,
        }
    }

    /// 无参数的空 schema（工具不需要参数时使用）
    pub fn empty() -> Self {
        Self::new("empty")
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn allow_extra(mut self, allow: bool) -> Self {
        self.allow_extra = allow;
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 转为 JSON Schema（draft-07 子集），用于工具定义与输出定义
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut prop = Map::new();
            prop.insert("type".into(), Value::String(field.ty.as_str().into()));
            if let Some(desc) = &field.description {
                prop.insert("description".into(), Value::String(desc.clone()));
            }
            properties.insert(field.name.clone(), Value::Object(prop));
        }
        let required: Vec<Value> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| Value::String(f.name.clone()))
            .collect();

        let mut schema = serde_json::json!({
            "type": "object",
            "title": self.name,
            "properties": properties,
            "required": required,
            "additionalProperties": self.allow_extra,
        });
        if let (Some(desc), Some(obj)) = (&self.description, schema.as_object_mut()) {
            obj.insert("description".into(), Value::String(desc.clone()));
        }
        schema
    }
}

/// 校验通过的值：字段已按声明类型转换
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatedValue(Map<String, Value>);

impl ValidatedValue {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.0.get(field).and_then(Value::as_i64)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// 反序列化为强类型输出
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ValidationFailure> {
        serde_json::from_value(self.to_value()).map_err(|e| {
            ValidationFailure::new(vec![FieldViolation::new(
                "$",
                ViolationKind::Incompatible(e.to_string()),
            )])
        })
    }
}

impl From<ValidatedValue> for Value {
    fn from(v: ValidatedValue) -> Self {
        Value::Object(v.0)
    }
}

/// 单个字段的违规类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// 必填字段缺失
    Missing,
    /// 必填字段为 null
    Null,
    /// 值无法转换为声明类型
    WrongType {
        expected: FieldType,
        found: &'static str,
    },
    /// 未声明字段（schema 不允许 extra）
    Unknown,
    /// 参数整体不是对象
    NotAnObject { found: &'static str },
    /// 校验通过但无法反序列化为目标类型
    Incompatible(String),
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Missing => f.write_str("field required"),
            ViolationKind::Null => f.write_str("field required, got null"),
            ViolationKind::WrongType { expected, found } => {
                write!(f, "expected {expected}, got {found}")
            }
            ViolationKind::Unknown => f.write_str("unknown field"),
            ViolationKind::NotAnObject { found } => write!(f, "expected object, got {found}"),
            ViolationKind::Incompatible(msg) => write!(f, "incompatible value: {msg}"),
        }
    }
}

/// 字段路径 + 违规类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub kind: ViolationKind,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.kind)
    }
}

/// 校验失败：列出全部违规字段（按字段名排序），而非仅第一个
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} validation error(s): {}", .violations.len(), join_violations(.violations))]
pub struct ValidationFailure {
    pub violations: Vec<FieldViolation>,
}

impl ValidationFailure {
    pub fn new(mut violations: Vec<FieldViolation>) -> Self {
        violations.sort_by(|a, b| a.field.cmp(&b.field));
        Self { violations }
    }

    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
