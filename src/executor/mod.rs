//! 执行器层：步骤执行器抽象与注册表
//!
//! 每次步骤调用必须返回显式结局（Completed / Blocked / RetryableFailure），
//! 由执行循环据此决定完成标记、重试或封锁——不存在「异常后步骤永远停在 InProgress」的路径。

pub mod llm_step;
pub mod registry;

use async_trait::async_trait;

use crate::tools::ToolExecutor;

pub use llm_step::LlmStepExecutor;
pub use registry::ExecutorRegistry;

/// 一次步骤调用的上下文：计划全文、步骤下标与文本；plan_id 即执行器的会话作用域
#[derive(Clone, Debug)]
pub struct StepContext {
    pub plan_id: String,
    pub plan_text: String,
    pub step_index: usize,
    pub step_text: String,
}

/// 步骤调用的显式结局
#[derive(Clone, Debug)]
pub enum StepOutcome {
    /// 步骤完成，携带结果文本
    Completed(String),
    /// 步骤无法推进，需要外部干预；循环会将其标记为 Blocked
    Blocked(String),
    /// 本次失败但可重试；超过重试上限后转为 Blocked
    RetryableFailure(String),
}

/// 步骤执行器：绑定到步骤 tag 的能力，执行一步并返回结局
#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// 执行一步；工具调用通过计划作用域的 ToolExecutor（已接溢出管线）
    async fn execute_step(&self, ctx: &StepContext, tools: &ToolExecutor) -> StepOutcome;
}
