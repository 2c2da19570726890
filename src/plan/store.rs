//! 计划注册表
//!
//! 以 plan id 为键的共享可变状态：外层读写锁保护映射本身，每个计划再有独立的互斥锁，
//! 同一计划内的状态变更被串行化，跨计划操作互不协调。注册表由调用方以 Arc 显式传递，
//! 不做进程级单例。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::core::AgentError;
use crate::plan::state::{select_current_step, SelectedStep};
use crate::plan::types::{Plan, PlanStatusSnapshot, StepStatus};

/// 计划注册表：create / get / mark_step / snapshot / select / remove
#[derive(Default)]
pub struct PlanStore {
    plans: RwLock<HashMap<String, Arc<Mutex<Plan>>>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册新计划；id 已存在返回 DuplicatePlan
    pub fn create_plan(
        &self,
        id: impl Into<String>,
        title: impl Into<String>,
        steps: Vec<String>,
    ) -> Result<(), AgentError> {
        let id = id.into();
        let mut plans = self.plans.write().unwrap();
        if plans.contains_key(&id) {
            return Err(AgentError::DuplicatePlan(id));
        }
        let plan = Plan::new(id.clone(), title, steps);
        plans.insert(id, Arc::new(Mutex::new(plan)));
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plans.read().unwrap().contains_key(id)
    }

    fn plan_handle(&self, id: &str) -> Result<Arc<Mutex<Plan>>, AgentError> {
        self.plans
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::PlanNotFound(id.to_string()))
    }

    /// 取计划的克隆（只读用途）
    pub fn get_plan(&self, id: &str) -> Result<Plan, AgentError> {
        let handle = self.plan_handle(id)?;
        let plan = handle.lock().unwrap();
        Ok(plan.clone())
    }

    /// 写入步骤状态；越界下标先补 NotStarted，计划不存在返回 PlanNotFound
    pub fn mark_step(&self, id: &str, index: usize, status: StepStatus) -> Result<(), AgentError> {
        let handle = self.plan_handle(id)?;
        let mut plan = handle.lock().unwrap();
        plan.set_status(index, status);
        Ok(())
    }

    /// 写入步骤备注
    pub fn set_step_note(
        &self,
        id: &str,
        index: usize,
        note: impl Into<String>,
    ) -> Result<(), AgentError> {
        let handle = self.plan_handle(id)?;
        let mut plan = handle.lock().unwrap();
        plan.set_note(index, note);
        Ok(())
    }

    /// 派生状态快照；计划不存在返回 PlanNotFound，否则总是成功
    pub fn snapshot(&self, id: &str) -> Result<PlanStatusSnapshot, AgentError> {
        let handle = self.plan_handle(id)?;
        let plan = handle.lock().unwrap();
        Ok(plan.snapshot())
    }

    /// 在计划锁内执行步骤选择（选中即迁移状态，需原子）
    pub fn select_current_step(&self, id: &str) -> Result<Option<SelectedStep>, AgentError> {
        let handle = self.plan_handle(id)?;
        let mut plan = handle.lock().unwrap();
        Ok(select_current_step(&mut plan))
    }

    /// 运行结束后移除计划（配合 Content Store 清理释放全部资源）
    pub fn remove(&self, id: &str) -> Option<Plan> {
        let handle = self.plans.write().unwrap().remove(id)?;
        let plan = handle.lock().unwrap();
        Some(plan.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_plan() -> PlanStore {
        let store = PlanStore::new();
        store
            .create_plan("p1", "test", vec!["a".into(), "b".into()])
            .unwrap();
        store
    }

    #[test]
    fn test_duplicate_plan_rejected() {
        let store = store_with_plan();
        let err = store.create_plan("p1", "again", vec![]).unwrap_err();
        assert!(matches!(err, AgentError::DuplicatePlan(_)));
    }

    #[test]
    fn test_missing_plan_errors() {
        let store = PlanStore::new();
        assert!(matches!(
            store.get_plan("nope"),
            Err(AgentError::PlanNotFound(_))
        ));
        assert!(matches!(
            store.mark_step("nope", 0, StepStatus::Completed),
            Err(AgentError::PlanNotFound(_))
        ));
        assert!(matches!(
            store.snapshot("nope"),
            Err(AgentError::PlanNotFound(_))
        ));
    }

    #[test]
    fn test_mark_step_out_of_range_pads() {
        let store = store_with_plan();
        store.mark_step("p1", 5, StepStatus::Completed).unwrap();
        let plan = store.get_plan("p1").unwrap();
        assert_eq!(plan.step_statuses.len(), 6);
        assert_eq!(plan.status_at(3), StepStatus::NotStarted);
        assert_eq!(plan.status_at(5), StepStatus::Completed);
    }

    #[test]
    fn test_mark_step_idempotent_snapshot() {
        let store = store_with_plan();
        store.mark_step("p1", 0, StepStatus::Completed).unwrap();
        let first = store.snapshot("p1").unwrap();
        store.mark_step("p1", 0, StepStatus::Completed).unwrap();
        let second = store.snapshot("p1").unwrap();
        assert_eq!(first.completed_steps, second.completed_steps);
        assert_eq!(first.status_counts, second.status_counts);
        assert_eq!(first.progress_percentage, second.progress_percentage);
    }

    #[test]
    fn test_remove_releases_plan() {
        let store = store_with_plan();
        assert!(store.remove("p1").is_some());
        assert!(!store.contains("p1"));
        assert!(store.remove("p1").is_none());
    }
}
