//! 计划执行循环
//!
//! PlanningFlow 是引擎的编排入口：起草并登记计划，然后顺序推进步骤，
//! 直到没有 Active 步骤为止。每一轮都是 选步骤 → 解析执行器 → 执行 → 按结局落状态。
//! 循环对外永远返回文本，内部错误会折叠成结果文本而不是向上抛。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::executor::{ExecutorRegistry, StepContext, StepOutcome};
use crate::flow::drafter::PlanDrafter;
use crate::llm::{LlmClient, Message};
use crate::plan::{render_plan_text, PlanStatusSnapshot, PlanStore, StepStatus};
use crate::storage::OverflowManager;
use crate::tools::{StorageTool, ToolExecutor, ToolRegistry};

#[cfg(feature = "browser")]
use crate::tools::BrowserTool;

/// 最终总结不可用时的固定回退文案
const SUMMARY_UNAVAILABLE: &str = "Plan completed; summary unavailable";

pub struct PlanningFlow {
    store: Arc<PlanStore>,
    drafter: PlanDrafter,
    llm: Arc<dyn LlmClient>,
    executors: Arc<ExecutorRegistry>,
    overflow: Arc<OverflowManager>,
    tool_timeout_secs: u64,
    max_step_retries: usize,
    agent_name: String,
    /// 正在执行的计划 id；资源释放对运行中的计划延迟到该次运行结束
    runs: Mutex<HashSet<String>>,
    /// 运行期间收到清理请求的计划 id，运行结束时兑现
    deferred_cleanup: Mutex<HashSet<String>>,
    #[cfg(feature = "browser")]
    allowed_domains: Vec<String>,
}

impl PlanningFlow {
    pub fn new(
        store: Arc<PlanStore>,
        llm: Arc<dyn LlmClient>,
        executors: Arc<ExecutorRegistry>,
        overflow: Arc<OverflowManager>,
        cfg: &AppConfig,
    ) -> Self {
        Self {
            store,
            drafter: PlanDrafter::new(llm.clone()),
            llm,
            executors,
            overflow,
            tool_timeout_secs: cfg.tools.tool_timeout_secs,
            max_step_retries: cfg.flow.max_step_retries,
            agent_name: cfg.app.agent_name.clone(),
            runs: Mutex::new(HashSet::new()),
            deferred_cleanup: Mutex::new(HashSet::new()),
            #[cfg(feature = "browser")]
            allowed_domains: cfg.tools.allowed_domains.clone(),
        }
    }

    /// 生成新的计划 id（毫秒时间戳，与结果文件目录名一致）
    pub fn new_plan_id() -> String {
        format!("plan_{}", chrono::Utc::now().timestamp_millis())
    }

    /// 当前计划状态快照；计划不存在返回 None
    pub fn plan_status(&self, plan_id: &str) -> Option<PlanStatusSnapshot> {
        self.store.snapshot(plan_id).ok()
    }

    /// 执行一次完整运行：起草计划、推进所有步骤、生成总结。
    /// 任何失败都折叠为返回文本；工具资源在所有退出路径上都会清理。
    pub async fn execute(
        &self,
        plan_id: &str,
        request: &str,
        cancel: CancellationToken,
    ) -> String {
        if !request.trim().is_empty() {
            let (title, steps) = self.drafter.draft(plan_id, request).await;
            if let Err(e) = self.store.create_plan(plan_id, title, steps) {
                tracing::error!(plan_id = %plan_id, error = %e, "plan creation failed");
                return format!("Failed to create plan for request: {}", request);
            }
        } else if !self.store.contains(plan_id) {
            return format!("Failed to create plan for request: {}", request);
        }

        self.runs.lock().unwrap().insert(plan_id.to_string());
        let tools = self.build_tool_executor(plan_id);
        let result = self.run_steps(plan_id, &tools, cancel).await;
        tools.cleanup().await;

        self.runs.lock().unwrap().remove(plan_id);
        if self.deferred_cleanup.lock().unwrap().remove(plan_id) {
            self.release_resources(plan_id);
        }
        result
    }

    async fn run_steps(
        &self,
        plan_id: &str,
        tools: &ToolExecutor,
        cancel: CancellationToken,
    ) -> String {
        let mut result = String::new();
        // 每步独立计次，重试上限只约束连续在同一步上的失败
        let mut retries: HashMap<usize, usize> = HashMap::new();

        loop {
            if cancel.is_cancelled() {
                tracing::info!(plan_id = %plan_id, "execution cancelled");
                result.push_str("Execution cancelled.\n");
                break;
            }

            let selected = match self.store.select_current_step(plan_id) {
                Ok(s) => s,
                Err(e) => {
                    result.push_str(&format!("Execution error: {}\n", e));
                    break;
                }
            };
            let step = match selected {
                Some(step) => step,
                None => {
                    result.push_str(&self.finalize(plan_id).await);
                    break;
                }
            };

            let executor = match self.executors.resolve(step.tag.as_deref()) {
                Ok(e) => e,
                Err(e) => {
                    let reason = e.to_string();
                    // 空注册表时没有任何步骤能推进，整个运行就此失败
                    if self.executors.is_empty() {
                        tracing::error!(plan_id = %plan_id, "executor registry is empty");
                        result.push_str(&format!("Execution error: {}\n", reason));
                        break;
                    }
                    tracing::warn!(
                        plan_id = %plan_id,
                        step = step.index,
                        tag = ?step.tag,
                        "no executor available, blocking step"
                    );
                    let _ = self
                        .store
                        .mark_step(plan_id, step.index, StepStatus::Blocked);
                    let _ = self.store.set_step_note(plan_id, step.index, &reason);
                    result.push_str(&format!("Step {} blocked: {}\n", step.index, reason));
                    continue;
                }
            };

            let plan_text = match self.store.snapshot(plan_id) {
                Ok(snapshot) => render_plan_text(&snapshot),
                Err(e) => {
                    result.push_str(&format!("Execution error: {}\n", e));
                    break;
                }
            };
            let ctx = StepContext {
                plan_id: plan_id.to_string(),
                plan_text,
                step_index: step.index,
                step_text: step.text.clone(),
            };

            tracing::info!(
                plan_id = %plan_id,
                step = step.index,
                executor = executor.name(),
                "executing step"
            );
            match executor.execute_step(&ctx, tools).await {
                StepOutcome::Completed(text) => {
                    let _ = self
                        .store
                        .mark_step(plan_id, step.index, StepStatus::Completed);
                    result.push_str(&text);
                    result.push('\n');
                }
                StepOutcome::Blocked(reason) => {
                    let _ = self
                        .store
                        .mark_step(plan_id, step.index, StepStatus::Blocked);
                    let _ = self.store.set_step_note(plan_id, step.index, &reason);
                    result.push_str(&format!("Step {} blocked: {}\n", step.index, reason));
                }
                StepOutcome::RetryableFailure(reason) => {
                    let attempts = retries.entry(step.index).or_insert(0);
                    *attempts += 1;
                    tracing::warn!(
                        plan_id = %plan_id,
                        step = step.index,
                        attempt = *attempts,
                        error = %reason,
                        "step failed"
                    );
                    result.push_str(&format!(
                        "Error executing step {}: {}\n",
                        step.index, reason
                    ));
                    if *attempts >= self.max_step_retries {
                        let note =
                            format!("blocked after {} failed attempts: {}", attempts, reason);
                        let _ = self
                            .store
                            .mark_step(plan_id, step.index, StepStatus::Blocked);
                        let _ = self.store.set_step_note(plan_id, step.index, &note);
                        result.push_str(&format!("Step {} blocked: retries exhausted\n", step.index));
                    }
                }
            }
        }

        result
    }

    /// 组装计划作用域的工具执行器。每个计划独立一套工具实例，
    /// 会话类工具（浏览器）的生命周期随之绑定到计划。
    fn build_tool_executor(&self, plan_id: &str) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(StorageTool::new(
            self.overflow.content_store().clone(),
            plan_id,
            &self.agent_name,
        ));
        #[cfg(feature = "browser")]
        registry.register(BrowserTool::new(plan_id, self.allowed_domains.clone()));

        ToolExecutor::new(
            registry,
            self.tool_timeout_secs,
            self.overflow.clone(),
            plan_id,
        )
    }

    /// 用 LLM 总结最终计划状态；总结失败降级为固定文案，绝不让收尾失败
    async fn finalize(&self, plan_id: &str) -> String {
        let plan_text = match self.store.snapshot(plan_id) {
            Ok(snapshot) => render_plan_text(&snapshot),
            Err(_) => return format!("Plan completed:\n\n{}", SUMMARY_UNAVAILABLE),
        };
        let prompt = format!(
            "The plan has been completed. Here is the final plan status:\n\n{}\n\n\
Please provide a summary of what was accomplished and any final thoughts.",
            plan_text
        );
        match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(summary) => format!("Plan completed:\n\n{}", summary),
            Err(e) => {
                tracing::warn!(plan_id = %plan_id, error = %e, "summary generation failed");
                format!("Plan completed:\n\n{}", SUMMARY_UNAVAILABLE)
            }
        }
    }

    /// 释放一个计划占用的全部资源。计划仍在运行时不立即动手——
    /// 运行中的循环与工具依赖这些资源，释放推迟到该次 execute 返回前兑现。
    pub fn cleanup(&self, plan_id: &str) {
        if self.runs.lock().unwrap().contains(plan_id) {
            self.deferred_cleanup
                .lock()
                .unwrap()
                .insert(plan_id.to_string());
            tracing::info!(plan_id = %plan_id, "plan still running, cleanup deferred");
            return;
        }
        self.release_resources(plan_id);
    }

    /// 内存计划、磁盘内容与溢出阈值覆盖的实际释放
    fn release_resources(&self, plan_id: &str) {
        self.store.remove(plan_id);
        self.overflow.clear_threshold(plan_id);
        self.overflow.content_store().cleanup_plan(plan_id);
        tracing::info!(plan_id = %plan_id, "plan resources released");
    }
}
