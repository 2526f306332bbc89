//! 编排循环集成测试：脚本化模型驱动，覆盖成功路径、各类错误、重试、取消与超时

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use typed_agent::llm::{
        AgentInfo, FunctionModel, LlmError, ModelGateway, ModelRequest, OpenAiModel,
    };
    use typed_agent::memory::{Message, ModelResponse, Part};
    use typed_agent::react::RunEvent;
    use typed_agent::tools::{Tool, ToolPayload};
    use typed_agent::{
        Agent, AgentError, FieldSchema, FieldType, ObjectSchema, RecoveryPolicy, RunOptions,
        ValidatedValue,
    };

    struct EchoTool;

    #[async_trait]
    impl Tool<()> for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text back"
        }

        fn parameters(&self) -> ObjectSchema {
            ObjectSchema::new("echo").field(FieldSchema::required("text", FieldType::String))
        }

        async fn execute(&self, _deps: &(), args: ValidatedValue) -> Result<ToolPayload, String> {
            Ok(args.into_map())
        }
    }

    struct FailTool;

    #[async_trait]
    impl Tool<()> for FailTool {
        fn name(&self) -> &str {
            "fail"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn execute(&self, _deps: &(), _args: ValidatedValue) -> Result<ToolPayload, String> {
            Err("boom".to_string())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool<()> for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Takes far too long"
        }

        async fn execute(&self, _deps: &(), _args: ValidatedValue) -> Result<ToolPayload, String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ToolPayload::new())
        }
    }

    /// 记录执行次数的工具
    struct CountingTool {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool<()> for CountingTool {
        fn name(&self) -> &str {
            "count"
        }

        fn description(&self) -> &str {
            "Counts its invocations"
        }

        async fn execute(&self, _deps: &(), _args: ValidatedValue) -> Result<ToolPayload, String> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(ToolPayload::new())
        }
    }

    struct SlowModel;

    #[async_trait]
    impl ModelGateway for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }

        async fn next(&self, _request: &ModelRequest<'_>) -> Result<ModelResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ModelResponse::default())
        }
    }

    fn output_schema() -> ObjectSchema {
        ObjectSchema::new("CityInfo")
            .field(FieldSchema::required("city", FieldType::String))
            .field(FieldSchema::required("population", FieldType::Integer))
    }

    fn agent(model: Arc<dyn ModelGateway>) -> Agent<(), ValidatedValue> {
        Agent::<(), ValidatedValue>::builder("test")
            .output_schema(output_schema())
            .tool(EchoTool)
            .and_then(|b| b.tool(FailTool))
            .and_then(|b| b.tool(SlowTool))
            .unwrap()
            .model(model)
            .build()
            .unwrap()
    }

    fn responses_so_far(messages: &[Message]) -> usize {
        messages.iter().filter(|m| m.as_response().is_some()).count()
    }

    fn has_retry_prompt(messages: &[Message]) -> bool {
        messages
            .iter()
            .any(|m| matches!(m, Message::RetryPrompt { .. }))
    }

    fn paris() -> Value {
        json!({"city": "Paris", "population": 2_100_000})
    }

    /// 记录调用次数的脚本化模型
    fn counting<F>(calls: Arc<AtomicUsize>, script: F) -> Arc<dyn ModelGateway>
    where
        F: Fn(&[Message]) -> ModelResponse + Send + Sync + 'static,
    {
        Arc::new(FunctionModel::new(move |messages: &[Message], _info: &AgentInfo<'_>| {
            calls.fetch_add(1, Ordering::SeqCst);
            script(messages)
        }))
    }

    #[tokio::test]
    async fn test_final_answer_round_trip() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = counting(calls.clone(), |_| {
            ModelResponse::new(vec![Part::final_answer(paris())])
        });

        let result = agent(model).run("Where?", &(), RunOptions::new()).await.unwrap();
        assert_eq!(result.value.to_value(), paris());
        assert_eq!(result.output.get_str("city"), Some("Paris"));
        assert_eq!(result.steps, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_stops_the_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = counting(calls.clone(), |_| {
            ModelResponse::new(vec![Part::tool_call("teleport", json!({}))])
        });

        let err = agent(model).run("Go", &(), RunOptions::new()).await.unwrap_err();
        match err {
            AgentError::UnknownTool(name) => assert_eq!(name, "teleport"),
            other => panic!("Expected UnknownTool, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tool_result_carries_call_id() {
        let model = counting(Arc::new(AtomicUsize::new(0)), |messages| {
            if responses_so_far(messages) == 0 {
                ModelResponse::new(vec![Part::tool_call_with_id(
                    "echo",
                    "call_1",
                    json!({"text": "hi"}),
                )])
            } else {
                ModelResponse::new(vec![Part::final_answer(paris())])
            }
        });

        let result = agent(model).run("Echo", &(), RunOptions::new()).await.unwrap();
        assert_eq!(result.steps, 2);
        match &result.messages[2] {
            Message::ToolResult {
                tool_name,
                call_id,
                content,
            } => {
                assert_eq!(tool_name, "echo");
                assert_eq!(call_id, "call_1");
                assert_eq!(content, &json!({"text": "hi"}));
            }
            other => panic!("Expected ToolResult, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_step_limit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = counting(calls.clone(), |_| {
            ModelResponse::new(vec![Part::tool_call("echo", json!({"text": "again"}))])
        });

        let err = agent(model)
            .run("Loop", &(), RunOptions::new().with_max_steps(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::StepLimitExceeded(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_responses() {
        let two_finals = counting(Arc::new(AtomicUsize::new(0)), |_| {
            ModelResponse::new(vec![Part::final_answer(paris()), Part::final_answer(paris())])
        });
        let err = agent(two_finals).run("x", &(), RunOptions::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponseError(_)));

        let duplicate_ids = counting(Arc::new(AtomicUsize::new(0)), |_| {
            ModelResponse::new(vec![
                Part::tool_call_with_id("echo", "call_x", json!({"text": "a"})),
                Part::tool_call_with_id("echo", "call_x", json!({"text": "b"})),
            ])
        });
        let err = agent(duplicate_ids).run("x", &(), RunOptions::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponseError(_)));
    }

    fn counting_agent(model: Arc<dyn ModelGateway>, runs: Arc<AtomicUsize>) -> Agent<(), ValidatedValue> {
        Agent::<(), ValidatedValue>::builder("test")
            .output_schema(output_schema())
            .tool(CountingTool { runs })
            .unwrap()
            .model(model)
            .build()
            .unwrap()
    }

    fn final_answer_with_id(call_id: &str) -> Part {
        Part::FinalAnswer {
            call_id: call_id.to_string(),
            arguments: paris(),
        }
    }

    #[tokio::test]
    async fn test_final_answer_sharing_tool_call_id_runs_no_tools() {
        let runs = Arc::new(AtomicUsize::new(0));
        let model = counting(Arc::new(AtomicUsize::new(0)), |_| {
            ModelResponse::new(vec![
                Part::tool_call_with_id("count", "call_x", json!({})),
                final_answer_with_id("call_x"),
            ])
        });
        let err = counting_agent(model, runs.clone())
            .run("x", &(), RunOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponseError(_)));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_final_answer_reusing_answered_id_is_malformed() {
        let runs = Arc::new(AtomicUsize::new(0));
        let model = counting(Arc::new(AtomicUsize::new(0)), |messages| {
            if responses_so_far(messages) == 0 {
                ModelResponse::new(vec![Part::tool_call_with_id("count", "call_x", json!({}))])
            } else {
                ModelResponse::new(vec![
                    Part::tool_call_with_id("count", "call_y", json!({})),
                    final_answer_with_id("call_x"),
                ])
            }
        });
        let err = counting_agent(model, runs.clone())
            .run("x", &(), RunOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponseError(_)));
        // 只有第一步的调用被执行
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_response() {
        let model = counting(Arc::new(AtomicUsize::new(0)), |_| {
            ModelResponse::new(vec![Part::text("let me think")])
        });
        let err = agent(model).run("x", &(), RunOptions::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::EmptyResponseError));
    }

    #[tokio::test]
    async fn test_invalid_final_answer_terminates_by_default() {
        let model = counting(Arc::new(AtomicUsize::new(0)), |_| {
            ModelResponse::new(vec![Part::final_answer(json!({"city": "Paris"}))])
        });
        let err = agent(model).run("x", &(), RunOptions::new()).await.unwrap_err();
        match err {
            AgentError::SchemaValidationError(failure) => {
                assert_eq!(failure.fields(), vec!["population"]);
            }
            other => panic!("Expected SchemaValidationError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validation_retry_lets_model_fix_answer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = counting(calls.clone(), |messages| {
            if has_retry_prompt(messages) {
                ModelResponse::new(vec![Part::final_answer(paris())])
            } else {
                ModelResponse::new(vec![Part::final_answer(json!({"city": "Paris"}))])
            }
        });

        let result = agent(model)
            .run("x", &(), RunOptions::new().with_recovery(RecoveryPolicy::retry_all(1)))
            .await
            .unwrap();
        assert_eq!(result.value.to_value(), paris());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_returns_original_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = counting(calls.clone(), |_| {
            ModelResponse::new(vec![Part::final_answer(json!({"population": "many"}))])
        });

        let err = agent(model)
            .run("x", &(), RunOptions::new().with_recovery(RecoveryPolicy::retry_all(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SchemaValidationError(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tool_failure_policy() {
        let script = |messages: &[Message]| {
            if has_retry_prompt(messages) {
                ModelResponse::new(vec![Part::final_answer(paris())])
            } else {
                ModelResponse::new(vec![Part::tool_call("fail", json!({}))])
            }
        };

        let err = agent(counting(Arc::new(AtomicUsize::new(0)), script))
            .run("x", &(), RunOptions::new())
            .await
            .unwrap_err();
        match err {
            AgentError::ToolExecutionError { tool, message } => {
                assert_eq!(tool, "fail");
                assert_eq!(message, "boom");
            }
            other => panic!("Expected ToolExecutionError, got {other:?}"),
        }

        let result = agent(counting(Arc::new(AtomicUsize::new(0)), script))
            .run("x", &(), RunOptions::new().with_recovery(RecoveryPolicy::retry_all(1)))
            .await
            .unwrap();
        assert_eq!(result.steps, 2);
        assert!(has_retry_prompt(&result.messages));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = agent(Arc::new(SlowModel))
            .run("x", &(), RunOptions::new().with_cancel_token(token))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_model_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = counting(calls.clone(), |_| {
            ModelResponse::new(vec![Part::final_answer(paris())])
        });
        let token = CancellationToken::new();
        token.cancel();

        let err = agent(model)
            .run("x", &(), RunOptions::new().with_cancel_token(token))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_timeout() {
        let err = agent(Arc::new(SlowModel))
            .run(
                "x",
                &(),
                RunOptions::new().with_model_timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ModelTimeout(_)));
    }

    #[tokio::test]
    async fn test_tool_timeout() {
        let model = counting(Arc::new(AtomicUsize::new(0)), |_| {
            ModelResponse::new(vec![Part::tool_call("slow", json!({}))])
        });
        let err = agent(model)
            .run(
                "x",
                &(),
                RunOptions::new().with_tool_timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        match err {
            AgentError::ToolTimeout { tool, .. } => assert_eq!(tool, "slow"),
            other => panic!("Expected ToolTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_live_model_blocked_when_requests_disallowed() {
        let live: Arc<dyn ModelGateway> = Arc::new(OpenAiModel::new(
            Some("http://127.0.0.1:9/v1"),
            "unused",
            Some("sk-test"),
        ));
        let err = agent(live)
            .run("x", &(), RunOptions::new().allow_model_requests(false))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_gateway_failure_is_model_unavailable() {
        let model = Arc::new(FunctionModel::fallible(|_: &[Message], _: &AgentInfo<'_>| {
            Err(LlmError::Transport("connection refused".to_string()))
        }));
        let err = agent(model).run("x", &(), RunOptions::new()).await.unwrap_err();
        match err {
            AgentError::ModelUnavailable(msg) => assert!(msg.contains("connection refused")),
            other => panic!("Expected ModelUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_model_override_per_run() {
        let base = agent(Arc::new(SlowModel));
        let scripted = counting(Arc::new(AtomicUsize::new(0)), |_| {
            ModelResponse::new(vec![Part::final_answer(paris())])
        });

        let result = base
            .run("x", &(), RunOptions::new().with_model(scripted.clone()))
            .await
            .unwrap();
        assert_eq!(result.value.to_value(), paris());

        let swapped = base.with_model(scripted);
        assert_eq!(swapped.tools().tool_names(), base.tools().tool_names());
        assert!(swapped.run("x", &(), RunOptions::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_events_are_streamed() {
        let model = counting(Arc::new(AtomicUsize::new(0)), |messages| {
            if responses_so_far(messages) == 0 {
                ModelResponse::new(vec![Part::tool_call_with_id(
                    "echo",
                    "call_e",
                    json!({"text": "hi"}),
                )])
            } else {
                ModelResponse::new(vec![Part::final_answer(paris())])
            }
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        agent(model)
            .run("x", &(), RunOptions::new().with_event_tx(tx))
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert!(matches!(events.first(), Some(RunEvent::StepUpdate { step: 0, .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            RunEvent::ToolResult { call_id, .. } if call_id == "call_e"
        )));
        assert!(matches!(events.last(), Some(RunEvent::FinalAnswer { .. })));
    }

    #[test]
    fn test_run_sync() {
        let model = counting(Arc::new(AtomicUsize::new(0)), |_| {
            ModelResponse::new(vec![Part::final_answer(paris())])
        });
        let result = agent(model).run_sync("x", &(), RunOptions::new()).unwrap();
        assert_eq!(result.output.get_i64("population"), Some(2_100_000));
    }

    #[tokio::test]
    async fn test_run_sync_inside_runtime_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = counting(calls.clone(), |_| {
            ModelResponse::new(vec![Part::final_answer(paris())])
        });
        match agent(model).run_sync("x", &(), RunOptions::new()) {
            Err(AgentError::Runtime(_)) => {}
            Err(other) => panic!("Expected Runtime error, got {other:?}"),
            Ok(_) => panic!("Expected Runtime error, got a result"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
