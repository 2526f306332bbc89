//! Schema 校验与数值转换
//!
//! 转换规则（确定性）：
//! - number：JSON 整数/浮点原样保留；去除首尾空白后能解析为有限 f64 的字符串转为浮点
//! - integer：JSON 整数原样保留；小数部分为 0 的浮点转为整数；能解析为 i64 的字符串转为整数
//! - string：仅接受字符串，不会把数字转成字符串
//! - boolean：JSON 布尔值，以及字符串 "true" / "false"
//! - 可选字段为 null 时保留 null；必填字段为 null 视为违规

use serde_json::{Map, Number, Value};

use super::{FieldType, FieldViolation, ObjectSchema, ValidatedValue, ValidationFailure, ViolationKind};

/// 按 schema 校验参数；失败时返回全部违规字段
pub fn validate(schema: &ObjectSchema, arguments: &Value) -> Result<ValidatedValue, ValidationFailure> {
    let Some(obj) = arguments.as_object() else {
        return Err(ValidationFailure::new(vec![FieldViolation::new(
            "$",
            ViolationKind::NotAnObject {
                found: json_kind(arguments),
            },
        )]));
    };

    let mut out = Map::new();
    let mut violations = Vec::new();

    for field in &schema.fields {
        match obj.get(&field.name) {
            None => {
                if field.required {
                    violations.push(FieldViolation::new(&field.name, ViolationKind::Missing));
                }
            }
            Some(Value::Null) => {
                if field.required {
                    violations.push(FieldViolation::new(&field.name, ViolationKind::Null));
                } else {
                    out.insert(field.name.clone(), Value::Null);
                }
            }
            Some(value) => match coerce(field.ty, value) {
                Some(v) => {
                    out.insert(field.name.clone(), v);
                }
                None => violations.push(FieldViolation::new(
                    &field.name,
                    ViolationKind::WrongType {
                        expected: field.ty,
                        found: json_kind(value),
                    },
                )),
            },
        }
    }

    for (key, value) in obj {
        if schema.get(key).is_some() {
            continue;
        }
        if schema.allow_extra {
            out.insert(key.clone(), value.clone());
        } else {
            violations.push(FieldViolation::new(key, ViolationKind::Unknown));
        }
    }

    if violations.is_empty() {
        Ok(ValidatedValue(out))
    } else {
        Err(ValidationFailure::new(violations))
    }
}

fn coerce(ty: FieldType, value: &Value) -> Option<Value> {
    match (ty, value) {
        (FieldType::String, Value::String(_)) => Some(value.clone()),
        (FieldType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (FieldType::Boolean, Value::String(s)) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        (FieldType::Number, Value::Number(_)) => Some(value.clone()),
        (FieldType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        (FieldType::Integer, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Some(value.clone())
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                    .map(|f| Value::from(f as i64))
            }
        }
        (FieldType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
