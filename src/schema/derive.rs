//! 从 schemars::JsonSchema 推导 ObjectSchema
//!
//! 仅支持扁平结构体：字段类型为 String / 整数 / 浮点 / bool 及其 Option。
//! 文档注释（或 #[schemars(description = ...)]）作为字段描述发送给模型。

use schemars::schema::{InstanceType, Schema, SchemaObject, SingleOrVec};
use schemars::{schema_for, JsonSchema};

use super::{FieldSchema, FieldType, ObjectSchema};
use crate::core::AgentError;

impl ObjectSchema {
    /// 由 Rust 类型推导输出 schema；嵌套对象、数组等不支持的字段返回 ConfigError
    pub fn from_type<T: JsonSchema>() -> Result<Self, AgentError> {
        let root = schema_for!(T);
        let schema = root.schema;

        let name = schema
            .metadata
            .as_ref()
            .and_then(|m| m.title.clone())
            .unwrap_or_else(T::schema_name);
        let description = schema.metadata.as_ref().and_then(|m| m.description.clone());

        let object = schema.object.as_ref().ok_or_else(|| {
            AgentError::ConfigError(format!("{name}: output type must be a struct with named fields"))
        })?;

        let mut fields = Vec::with_capacity(object.properties.len());
        for (field_name, prop) in &object.properties {
            let Schema::Object(prop) = prop else {
                return Err(AgentError::ConfigError(format!(
                    "{name}.{field_name}: boolean schemas are not supported"
                )));
            };
            let (ty, nullable) = field_type(prop).ok_or_else(|| {
                AgentError::ConfigError(format!(
                    "{name}.{field_name}: only string, integer, number and boolean fields are supported"
                ))
            })?;
            fields.push(FieldSchema {
                name: field_name.clone(),
                ty,
                required: object.required.contains(field_name) && !nullable,
                description: prop.metadata.as_ref().and_then(|m| m.description.clone()),
            });
        }

        let allow_extra = matches!(
            object.additional_properties.as_deref(),
            Some(Schema::Bool(true))
        );

        Ok(Self {
            name,
            description,
            fields,
            allow_extra,
        })
    }
}

/// 返回 (字段类型, 是否允许 null)
fn field_type(schema: &SchemaObject) -> Option<(FieldType, bool)> {
    let types: Vec<InstanceType> = match schema.instance_type.as_ref()? {
        SingleOrVec::Single(t) => vec![t.as_ref().clone()],
        SingleOrVec::Vec(ts) => ts.clone(),
    };
    let nullable = types.contains(&InstanceType::Null);
    let ty = types.iter().find_map(|t| match t {
        InstanceType::String => Some(FieldType::String),
        InstanceType::Integer => Some(FieldType::Integer),
        InstanceType::Number => Some(FieldType::Number),
        InstanceType::Boolean => Some(FieldType::Boolean),
        _ => None,
    })?;
    Some((ty, nullable))
}
