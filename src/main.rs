//! Typed Agent - 首都查询示例
//!
//! 入口：初始化日志、加载配置、打开首都数据库，向模型提问并打印结构化结果。
//! 用法：typed-agent [提示词]

use anyhow::Context;
use typed_agent::{
    capitals::{Capital, CapitalDeps, CapitalStore, QueryNumbersTool, DEFAULT_PROMPT},
    config::{load_config, AppConfig},
    core::create_model_from_config,
    observability, Agent, RunOptions,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let store = match &cfg.data.database {
        Some(path) => CapitalStore::open(path)
            .with_context(|| format!("Failed to open capitals database {}", path.display()))?,
        None => CapitalStore::sample().context("Failed to seed sample capitals")?,
    };
    let deps = CapitalDeps::new(store);

    let agent = Agent::<CapitalDeps, Capital>::builder("capitals")
        .with_config(&cfg)
        .typed_output()
        .and_then(|b| b.tool(QueryNumbersTool))
        .context("Failed to register tools")?
        .model(create_model_from_config(&cfg))
        .build()
        .context("Failed to build agent")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let prompt = if args.is_empty() {
        DEFAULT_PROMPT.to_string()
    } else {
        args.join(" ")
    };

    let result = agent
        .run(&prompt, &deps, RunOptions::new())
        .await
        .context("Agent run failed")?;

    tracing::info!(steps = result.steps, messages = result.messages.len(), "done");
    println!("{}", serde_json::to_string_pretty(&result.output)?);
    Ok(())
}
