//! Agent 错误类型
//!
//! PlanningFlow 是错误边界：凡是能本地恢复的（起草失败、存储失败、未知 action）
//! 都降级为文本结果，只有无法恢复的错误（如 NoExecutorAvailable）作为运行的最终失败文本。

use thiserror::Error;

/// 计划执行过程中可能出现的错误（计划、执行器、存储、LLM 等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Duplicate plan: {0}")]
    DuplicatePlan(String),

    /// 起草协作方失败；由默认三步计划兜底恢复
    #[error("Plan creation failed: {0}")]
    PlanCreationFailure(String),

    #[error("Step execution failed: {0}")]
    StepExecutionFailed(String),

    /// 注册表为空，没有任何执行器可以推进步骤，整个运行失败
    #[error("No executor available")]
    NoExecutorAvailable,

    /// 存储写入失败；OverflowManager 用截断内容兜底，不向上抛
    #[error("Storage I/O failed: {0}")]
    StorageIo(String),

    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Cancelled")]
    Cancelled,
}
