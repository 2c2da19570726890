//! 计划起草
//!
//! 用模板化指令（内嵌 plan id 与请求）让 LLM 产出 {"title": "...", "steps": [...]}。
//! 起草失败或产出不可用时合成默认三步计划——起草协作方挂掉不会让整个运行失败。

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{LlmClient, Message};

/// 默认计划标题里请求文本的最大字符数
const TITLE_CHARS: usize = 50;

/// LLM 起草产出
#[derive(Debug, Deserialize)]
struct DraftedPlan {
    title: String,
    steps: Vec<String>,
}

/// 计划起草器：持有 LLM，draft 永不失败（失败即回退默认计划）
pub struct PlanDrafter {
    llm: Arc<dyn LlmClient>,
}

impl PlanDrafter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 起草计划，返回 (title, steps)；任何失败路径都回退到默认三步计划
    pub async fn draft(&self, plan_id: &str, request: &str) -> (String, Vec<String>) {
        let prompt = format!(
            "Create a reasonable plan with clear steps to accomplish the task:\n\n\
{}\n\n\
The plan id is {}. Respond with a single JSON object:\n\
{{\"title\": \"<short title>\", \"steps\": [\"<step 1>\", \"<step 2>\", ...]}}\n\
A step may start with an executor marker like [BROWSER] to request a specific executor.",
            request, plan_id
        );

        match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(output) => match parse_drafted_plan(&output) {
                Some(plan) => {
                    tracing::info!(plan_id = %plan_id, steps = plan.steps.len(), "plan drafted");
                    (plan.title, plan.steps)
                }
                None => {
                    tracing::warn!(plan_id = %plan_id, "draft output unusable, creating default plan");
                    default_plan(request)
                }
            },
            Err(e) => {
                tracing::warn!(plan_id = %plan_id, error = %e, "plan drafting failed, creating default plan");
                default_plan(request)
            }
        }
    }
}

fn parse_drafted_plan(output: &str) -> Option<DraftedPlan> {
    let trimmed = output.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else {
        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        if start >= end {
            return None;
        }
        &trimmed[start..=end]
    };

    let plan: DraftedPlan = serde_json::from_str(json_str).ok()?;
    if plan.steps.is_empty() || plan.steps.iter().any(|s| s.trim().is_empty()) {
        return None;
    }
    Some(plan)
}

/// 默认三步计划：标题取请求前 50 字符（超长加省略号）
pub fn default_plan(request: &str) -> (String, Vec<String>) {
    let truncated: String = request.chars().take(TITLE_CHARS).collect();
    let title = if request.chars().count() > TITLE_CHARS {
        format!("Plan for: {}...", truncated)
    } else {
        format!("Plan for: {}", truncated)
    };
    (
        title,
        vec![
            "Analyze request".to_string(),
            "Execute task".to_string(),
            "Verify results".to_string(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_draft_parses_json_plan() {
        let llm = Arc::new(MockLlmClient::with_responses(vec![
            r#"{"title": "Research docs", "steps": ["[BROWSER] open docs", "summarize"]}"#,
        ]));
        let drafter = PlanDrafter::new(llm);
        let (title, steps) = drafter.draft("p1", "research something").await;
        assert_eq!(title, "Research docs");
        assert_eq!(steps.len(), 2);
    }

    #[tokio::test]
    async fn test_draft_failure_falls_back_to_default() {
        let drafter = PlanDrafter::new(Arc::new(MockLlmClient::failing()));
        let (title, steps) = drafter.draft("p1", "do the thing").await;
        assert_eq!(title, "Plan for: do the thing");
        assert_eq!(
            steps,
            vec!["Analyze request", "Execute task", "Verify results"]
        );
    }

    #[tokio::test]
    async fn test_unusable_output_falls_back() {
        let llm = Arc::new(MockLlmClient::with_responses(vec!["sure, here is a plan!"]));
        let drafter = PlanDrafter::new(llm);
        let (_, steps) = drafter.draft("p1", "x").await;
        assert_eq!(steps.len(), 3);
    }

    #[test]
    fn test_default_title_truncated_at_50_chars() {
        let long = "a".repeat(80);
        let (title, _) = default_plan(&long);
        assert_eq!(title, format!("Plan for: {}...", "a".repeat(50)));
        let (title, _) = default_plan("short");
        assert_eq!(title, "Plan for: short");
    }
}
