//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 可预置一串脚本化回复按序弹出（起草 -> 步骤 -> 总结），脚本耗尽后回显最后一条 User 消息。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// Mock 客户端：按脚本回复；无脚本时回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<String>>,
    /// 为 true 时 complete 总是返回 Err，用于测试降级路径
    fail: bool,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置回复脚本，complete 按序弹出
    pub fn with_responses(responses: Vec<impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fail: false,
        }
    }

    /// 总是失败的客户端（测试起草失败与总结失败的降级路径）
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if self.fail {
            return Err("mock failure".to_string());
        }
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return Ok(next);
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }
}
