//! query_numbers 工具：按首都名查询人口与面积

use async_trait::async_trait;
use serde_json::Value;

use super::CapitalDeps;
use crate::schema::{FieldSchema, FieldType, ObjectSchema, ValidatedValue};
use crate::tools::{Tool, ToolPayload};

/// 查询首都人口与面积；查无此城时返回空对象 {}
pub struct QueryNumbersTool;

#[async_trait]
impl Tool<CapitalDeps> for QueryNumbersTool {
    fn name(&self) -> &str {
        "query_numbers"
    }

    fn description(&self) -> &str {
        "query the number of inhabitants and size for a capital"
    }

    fn parameters(&self) -> ObjectSchema {
        ObjectSchema::new("query_numbers").field(
            FieldSchema::required("capital_name", FieldType::String)
                .describe("name of the capital, e.g. Berlin"),
        )
    }

    fn returns(&self) -> Option<ObjectSchema> {
        Some(
            ObjectSchema::new("capital_numbers")
                .field(FieldSchema::optional("inhabitants", FieldType::Number))
                .field(FieldSchema::optional("size", FieldType::Number).describe("km²")),
        )
    }

    async fn execute(&self, deps: &CapitalDeps, args: ValidatedValue) -> Result<ToolPayload, String> {
        let name = args
            .get_str("capital_name")
            .ok_or("capital_name is required")?;

        let mut out = ToolPayload::new();
        match deps.store.lookup(name).await.map_err(|e| e.to_string())? {
            Some(numbers) => {
                out.insert("inhabitants".into(), Value::from(numbers.inhabitants));
                out.insert("size".into(), Value::from(numbers.size));
            }
            None => tracing::info!(capital = name, "no data for capital"),
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::capitals::CapitalStore;
    use crate::core::AgentError;
    use crate::tools::ToolRegistry;

    fn registry() -> ToolRegistry<CapitalDeps> {
        let mut registry = ToolRegistry::new();
        registry.register(QueryNumbersTool).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_known_capital() {
        let store = CapitalStore::in_memory().unwrap();
        store.insert("Berlin", 4_000_000.0, 900.0).unwrap();
        let deps = CapitalDeps::new(store);

        let out = registry()
            .invoke("query_numbers", &deps, &json!({"capital_name": "Berlin"}))
            .await
            .unwrap();
        assert_eq!(out["inhabitants"], json!(4_000_000.0));
        assert_eq!(out["size"], json!(900.0));
    }

    #[tokio::test]
    async fn test_unknown_capital_returns_empty_object() {
        let deps = CapitalDeps::new(CapitalStore::in_memory().unwrap());
        let out = registry()
            .invoke("query_numbers", &deps, &json!({"capital_name": "Atlantis"}))
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_missing_capital_name() {
        let deps = CapitalDeps::new(CapitalStore::in_memory().unwrap());
        let err = registry()
            .invoke("query_numbers", &deps, &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));
    }
}
