//! Mantis - 计划执行引擎
//!
//! 入口：初始化日志与配置，装配计划仓库 / 存储 / 执行器，启动 HTTP 服务。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::RwLock;

use mantis::config::load_config;
use mantis::executor::{ExecutorRegistry, LlmStepExecutor};
use mantis::flow::PlanningFlow;
use mantis::llm::create_llm_from_config;
use mantis::observability;
use mantis::plan::PlanStore;
use mantis::server::{build_router, AppState};
use mantis::storage::{ContentStore, OverflowManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;

    let working_dir = cfg
        .app
        .working_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("workspace"));
    std::fs::create_dir_all(&working_dir).context("Failed to create working directory")?;

    let llm = create_llm_from_config(&cfg);
    let overflow = Arc::new(OverflowManager::new(
        ContentStore::new(&working_dir),
        cfg.storage.content_threshold,
    ));

    let mut executors = ExecutorRegistry::new(cfg.flow.executor_fallback.clone());
    executors.register(
        "llm",
        Arc::new(LlmStepExecutor::new(llm.clone(), cfg.flow.max_tool_rounds)),
    );

    let flow = PlanningFlow::new(
        Arc::new(PlanStore::new()),
        llm,
        Arc::new(executors),
        overflow,
        &cfg,
    );

    let state = Arc::new(AppState {
        flow: Arc::new(flow),
        active_plan: RwLock::new(None),
    });

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.bind))?;
    tracing::info!(addr = %cfg.server.bind, workdir = %working_dir.display(), "mantis listening");

    axum::serve(listener, build_router(state))
        .await
        .context("Server error")?;

    Ok(())
}
