//! 工具执行器
//!
//! 持有 ToolRegistry 引用与本次运行的工具超时，execute(tool_name, deps, args) 在超时内调用 registry.invoke，
//! 超时返回 ToolTimeout；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ToolPayload, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并记录审计日志
pub struct ToolExecutor<'a, D> {
    registry: &'a ToolRegistry<D>,
    timeout: Duration,
}

impl<'a, D: Send + Sync + 'static> ToolExecutor<'a, D> {
    pub fn new(registry: &'a ToolRegistry<D>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// 执行指定工具；超时返回 ToolTimeout，其它错误原样透传；输出 JSON 审计日志
    pub async fn execute(
        &self,
        tool_name: &str,
        call_id: &str,
        deps: &D,
        args: &Value,
    ) -> Result<ToolPayload, AgentError> {
        let start = Instant::now();
        let result = timeout(self.timeout, self.registry.invoke(tool_name, deps, args)).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(AgentError::InvalidArguments { .. })) => "invalid_arguments",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "call_id": call_id,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": json_preview(args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(r) => r,
            Err(_) => Err(AgentError::ToolTimeout {
                tool: tool_name.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

/// 日志与事件中 JSON 预览的最大字符数
const PREVIEW_CHARS: usize = 200;

/// 截断的 JSON 预览（超过 PREVIEW_CHARS 时以 ... 结尾）
pub(crate) fn json_preview(value: &Value) -> String {
    let s = value.to_string();
    if s.chars().count() > PREVIEW_CHARS {
        format!("{}...", s.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::schema::ValidatedValue;
    use crate::tools::Tool;

    struct SleepTool;

    #[async_trait]
    impl Tool<()> for SleepTool {
        fn name(&self) -> &str {
            "sleep"
        }

        fn description(&self) -> &str {
            "Sleeps for a while"
        }

        async fn execute(&self, _deps: &(), _args: ValidatedValue) -> Result<ToolPayload, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolPayload::new())
        }
    }

    #[tokio::test]
    async fn test_tool_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(SleepTool).unwrap();
        let executor = ToolExecutor::new(&registry, Duration::from_millis(20));

        let err = executor.execute("sleep", "c1", &(), &json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout { tool, .. } if tool == "sleep"));
    }

    #[test]
    fn test_json_preview_truncates() {
        let long = json!({"text": "x".repeat(500)});
        assert_eq!(json_preview(&json!({"a": 1})), r#"{"a":1}"#);
        let preview = json_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
    }
}
