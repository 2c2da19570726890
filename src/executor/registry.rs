//! 执行器注册表
//!
//! resolve(tag)：tag 命中注册表直接返回；未命中时按配置的回退顺序取第一个存在的执行器。
//! 多数计划不需要按步骤指定执行器，合理的默认顺序让系统无需逐项配置即可用。

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::AgentError;
use crate::executor::StepExecutor;

/// 执行器注册表：tag -> 执行器，外加确定性的回退顺序
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
    fallback_order: Vec<String>,
}

impl ExecutorRegistry {
    pub fn new(fallback_order: Vec<String>) -> Self {
        Self {
            executors: HashMap::new(),
            fallback_order,
        }
    }

    pub fn register(&mut self, key: impl Into<String>, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(key.into(), executor);
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// 解析步骤的执行器；注册表为空或回退顺序也无命中时返回 NoExecutorAvailable
    pub fn resolve(&self, tag: Option<&str>) -> Result<Arc<dyn StepExecutor>, AgentError> {
        if let Some(tag) = tag {
            if let Some(executor) = self.executors.get(tag) {
                return Ok(executor.clone());
            }
        }
        for key in &self.fallback_order {
            if let Some(executor) = self.executors.get(key) {
                return Ok(executor.clone());
            }
        }
        Err(AgentError::NoExecutorAvailable)
    }
}
