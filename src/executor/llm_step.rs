//! 默认 LLM 步骤执行器
//!
//! 把计划全文与当前步骤交给 LLM，允许其以 JSON Tool Call（{"tool": "...", "args": {...}}）
//! 调用工具，观察结果后继续，直到给出普通文本回复作为步骤结果。
//! 工具调用轮数有上限；LLM 失败与超轮返回 RetryableFailure，由循环决定重试或封锁。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::executor::{StepContext, StepExecutor, StepOutcome};
use crate::llm::{LlmClient, Message};
use crate::tools::ToolExecutor;

use async_trait::async_trait;

/// LLM 返回的 Tool Call（简化 JSON：{"tool": "storage", "args": {"action": "..."}}）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: serde_json::Value,
}

/// 执行器单轮输出
#[derive(Debug, Clone)]
pub enum ExecutorOutput {
    /// 步骤结果文本
    Response(String),
    /// 需要执行工具
    ToolCall(ToolCall),
}

/// 解析 LLM 输出：若含有效 JSON 且 tool 非空则为 ToolCall，否则为 Response
pub fn parse_executor_output(output: &str) -> Result<ExecutorOutput, AgentError> {
    let trimmed = output.trim();

    // 尝试提取 JSON 块（```json ... ``` 或纯 JSON）
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        return Ok(ExecutorOutput::Response(trimmed.to_string()));
    };

    match serde_json::from_str::<ToolCall>(json_str) {
        Ok(parsed) if !parsed.tool.is_empty() => Ok(ExecutorOutput::ToolCall(parsed)),
        _ => Ok(ExecutorOutput::Response(trimmed.to_string())),
    }
}

/// 默认执行器：LLM + 工具小循环
pub struct LlmStepExecutor {
    llm: Arc<dyn LlmClient>,
    max_tool_rounds: usize,
}

impl LlmStepExecutor {
    pub fn new(llm: Arc<dyn LlmClient>, max_tool_rounds: usize) -> Self {
        Self {
            llm,
            max_tool_rounds,
        }
    }

    fn system_prompt(&self, tools: &ToolExecutor) -> String {
        let mut prompt = String::from(
            "You are a step executor inside a plan execution engine. \
You are given the full plan status and one current step. Execute only that step.\n\n\
To use a tool, reply with exactly one JSON object: {\"tool\": \"<name>\", \"args\": {\"action\": \"<action>\", ...}}\n\
When the step is done, reply with plain text describing the result (no JSON).\n\n\
Available tools:\n",
        );
        for (name, desc) in tools.tool_descriptions() {
            prompt.push_str(&format!("- {}: {}\n", name, desc));
        }
        prompt.push_str("\nTool schemas:\n");
        prompt.push_str(&tools.to_schema_json());
        prompt
    }
}

#[async_trait]
impl StepExecutor for LlmStepExecutor {
    fn name(&self) -> &str {
        "llm"
    }

    async fn execute_step(&self, ctx: &StepContext, tools: &ToolExecutor) -> StepOutcome {
        let system = self.system_prompt(tools);
        let mut messages = vec![
            Message::system(system),
            Message::user(format!(
                "Current plan status:\n\n{}\n\nYour current step (index {}): {}\n\nExecute this step and report the result.",
                ctx.plan_text, ctx.step_index, ctx.step_text
            )),
        ];

        for round in 0..self.max_tool_rounds {
            let output = match self.llm.complete(&messages).await {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(plan_id = %ctx.plan_id, step = ctx.step_index, error = %e, "executor LLM call failed");
                    return StepOutcome::RetryableFailure(format!("LLM error: {}", e));
                }
            };

            match parse_executor_output(&output) {
                Ok(ExecutorOutput::Response(resp)) => return StepOutcome::Completed(resp),
                Ok(ExecutorOutput::ToolCall(tc)) => {
                    tracing::info!(
                        plan_id = %ctx.plan_id,
                        step = ctx.step_index,
                        round,
                        tool = %tc.tool,
                        "executor tool call"
                    );
                    // 工具结果已经过溢出管线，观察文本有大小上界
                    let observation = match tools.execute(&tc.tool, tc.args.clone()).await {
                        Ok(r) => r,
                        Err(e) => format!("Error: {}", e),
                    };
                    messages.push(Message::assistant(format!(
                        "Tool call: {} | Result: {}",
                        tc.tool, observation
                    )));
                    messages.push(Message::user(format!(
                        "Observation from {}: {}\nContinue with the step.",
                        tc.tool, observation
                    )));
                }
                Err(e) => {
                    return StepOutcome::RetryableFailure(format!("unparseable executor output: {}", e))
                }
            }
        }

        StepOutcome::RetryableFailure(format!(
            "tool round limit ({}) reached without a final response",
            self.max_tool_rounds
        ))
    }
}
