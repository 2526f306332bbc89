//! Typed Agent - Rust 工具调用智能体
//!
//! 模块划分：
//! - **agent**: Agent 运行入口（run / run_sync / RunOptions）
//! - **capitals**: 首都查询示例（Capital 输出、SQLite 数据源、query_numbers 工具）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、恢复策略、Agent 构建器
//! - **llm**: 模型网关抽象与实现（OpenAI 兼容 / FunctionModel / TestModel）
//! - **memory**: 对话历史（消息、响应片段、call_id 关联）
//! - **observability**: tracing 日志初始化
//! - **react**: 编排主循环与过程事件
//! - **schema**: 结构化 schema、校验与类型推导
//! - **tools**: 工具 trait、注册表与带超时的执行器

pub mod agent;
pub mod capitals;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod schema;
pub mod tools;

pub use agent::{Agent, RunOptions, RunOutput, RunResult};
pub use core::{AgentBuilder, AgentError, FailurePolicy, RecoveryPolicy};
pub use schema::{FieldSchema, FieldType, ObjectSchema, ValidatedValue, ValidationFailure};
