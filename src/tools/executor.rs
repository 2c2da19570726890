//! 工具执行器
//!
//! 持有 ToolRegistry、全局超时与溢出管理器，execute(tool_name, args) 在超时内调用
//! registry.execute，结果一律先经 OverflowManager 再返回——这是「所有工具结果
//! 在回到计划/执行器层之前都有大小上界」契约的唯一实施点。
//! 超时或失败时转为 AgentError；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::storage::OverflowManager;
use crate::tools::ToolRegistry;

/// 工具执行器：计划作用域，对每次调用施加超时与溢出处理
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    overflow: Arc<OverflowManager>,
    plan_id: String,
}

impl ToolExecutor {
    pub fn new(
        registry: ToolRegistry,
        timeout_secs: u64,
        overflow: Arc<OverflowManager>,
        plan_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            overflow,
            plan_id: plan_id.into(),
        }
    }

    /// 执行指定工具；超时返回 StepExecutionFailed，工具返回 Err 同样转 StepExecutionFailed；
    /// 成功结果经溢出管理器处理后返回（可能已被替换为摘要）
    pub async fn execute(
        &self,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "plan_id": self.plan_id,
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => {
                let processed = self.overflow.process(&content, Some(&self.plan_id));
                Ok(processed.summary)
            }
            Ok(Err(e)) => Err(AgentError::StepExecutionFailed(format!(
                "{}: {}",
                tool_name, e
            ))),
            Err(_) => Err(AgentError::StepExecutionFailed(format!(
                "{}: timeout",
                tool_name
            ))),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.registry.tool_descriptions()
    }

    pub fn to_schema_json(&self) -> String {
        self.registry.to_schema_json()
    }

    /// 计划结束/中止时释放工具持有的计划级资源
    pub async fn cleanup(&self) {
        self.registry.cleanup_all().await;
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
