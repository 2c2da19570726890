//! 计划数据模型
//!
//! Plan 持有并行的 steps / step_statuses / step_notes 列表：状态列表允许短于步骤列表，
//! 缺失位置一律视为 NotStarted（惰性默认），写入越界索引前先用 NotStarted 补齐。
//! 步骤类型标记（如 "[BROWSER] 打开页面"）在创建时解析一次存入 tags，循环中不再做正则。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 步骤状态；Active 集合 = {NotStarted, InProgress}，处于其中的步骤可被选为当前步骤
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

impl StepStatus {
    /// 是否可被执行循环选中
    pub fn is_active(&self) -> bool {
        matches!(self, StepStatus::NotStarted | StepStatus::InProgress)
    }

    /// 全部状态，供统计初始化
    pub fn all() -> [StepStatus; 4] {
        [
            StepStatus::NotStarted,
            StepStatus::InProgress,
            StepStatus::Completed,
            StepStatus::Blocked,
        ]
    }

    /// 计划文本渲染用的状态标记
    pub fn mark(&self) -> &'static str {
        match self {
            StepStatus::NotStarted => "[ ]",
            StepStatus::InProgress => "[→]",
            StepStatus::Completed => "[✓]",
            StepStatus::Blocked => "[!]",
        }
    }
}

/// 一个计划：步骤文本在创建时固定，状态与备注随执行推进
#[derive(Clone, Debug)]
pub struct Plan {
    pub id: String,
    pub title: String,
    pub steps: Vec<String>,
    pub step_statuses: Vec<StepStatus>,
    pub step_notes: Vec<String>,
    /// 每步的执行器类型标记（创建时从步骤文本前缀解析，小写）
    pub tags: Vec<Option<String>>,
}

impl Plan {
    pub fn new(id: impl Into<String>, title: impl Into<String>, steps: Vec<String>) -> Self {
        let tags = steps.iter().map(|s| parse_step_tag(s)).collect();
        Self {
            id: id.into(),
            title: title.into(),
            steps,
            step_statuses: Vec::new(),
            step_notes: Vec::new(),
            tags,
        }
    }

    /// 指定下标的状态；越界视为 NotStarted
    pub fn status_at(&self, index: usize) -> StepStatus {
        self.step_statuses
            .get(index)
            .copied()
            .unwrap_or(StepStatus::NotStarted)
    }

    /// 写入状态；必要时先用 NotStarted 补齐中间位置，永不越界失败
    pub fn set_status(&mut self, index: usize, status: StepStatus) {
        while self.step_statuses.len() <= index {
            self.step_statuses.push(StepStatus::NotStarted);
        }
        self.step_statuses[index] = status;
    }

    /// 写入备注；缺失位置补空串
    pub fn set_note(&mut self, index: usize, note: impl Into<String>) {
        while self.step_notes.len() <= index {
            self.step_notes.push(String::new());
        }
        self.step_notes[index] = note.into();
    }

    /// 派生只读快照（按需重算，不独立持久化）
    pub fn snapshot(&self) -> PlanStatusSnapshot {
        let steps: Vec<Step> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, text)| Step {
                text: text.clone(),
                status: self.status_at(i),
                notes: self.step_notes.get(i).cloned().unwrap_or_default(),
                tag: self.tags.get(i).cloned().flatten(),
            })
            .collect();

        let mut status_counts: HashMap<StepStatus, usize> =
            StepStatus::all().into_iter().map(|s| (s, 0)).collect();
        for step in &steps {
            *status_counts.entry(step.status).or_insert(0) += 1;
        }

        let completed_steps = status_counts[&StepStatus::Completed];
        let total_steps = steps.len();
        let progress_percentage = if total_steps > 0 {
            completed_steps as f64 / total_steps as f64 * 100.0
        } else {
            0.0
        };

        PlanStatusSnapshot {
            plan_id: self.id.clone(),
            title: self.title.clone(),
            steps,
            status_counts,
            completed_steps,
            total_steps,
            progress_percentage,
        }
    }
}

/// 快照中的单个步骤
#[derive(Clone, Debug, Serialize)]
pub struct Step {
    pub text: String,
    pub status: StepStatus,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// 计划状态快照：/status 接口与计划文本渲染的数据源
#[derive(Clone, Debug, Serialize)]
pub struct PlanStatusSnapshot {
    pub plan_id: String,
    pub title: String,
    pub steps: Vec<Step>,
    pub status_counts: HashMap<StepStatus, usize>,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub progress_percentage: f64,
}

/// 从步骤文本前缀解析执行器类型标记：`[A-Z_]+` 方括号形式，返回小写；无标记返回 None
pub fn parse_step_tag(text: &str) -> Option<String> {
    static STEP_TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = STEP_TAG_RE.get_or_init(|| Regex::new(r"^\s*\[([A-Z_]+)\]").expect("step tag pattern"));
    re.captures(text)
        .map(|cap| cap[1].to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_step_tag() {
        assert_eq!(parse_step_tag("[BROWSER] open page"), Some("browser".into()));
        assert_eq!(parse_step_tag("  [FILE_AGENT] write"), Some("file_agent".into()));
        assert_eq!(parse_step_tag("no marker here"), None);
        assert_eq!(parse_step_tag("[lower] not a marker"), None);
    }

    #[test]
    fn test_status_padding() {
        let mut plan = Plan::new("p1", "t", vec!["a".into(), "b".into(), "c".into()]);
        plan.set_status(2, StepStatus::Completed);
        assert_eq!(plan.status_at(0), StepStatus::NotStarted);
        assert_eq!(plan.status_at(1), StepStatus::NotStarted);
        assert_eq!(plan.status_at(2), StepStatus::Completed);
        // 越界读取一律 NotStarted
        assert_eq!(plan.status_at(99), StepStatus::NotStarted);
    }

    #[test]
    fn test_snapshot_counts_sum_to_total() {
        let mut plan = Plan::new("p1", "t", vec!["a".into(), "b".into(), "c".into()]);
        plan.set_status(0, StepStatus::Completed);
        plan.set_status(1, StepStatus::Blocked);
        let snap = plan.snapshot();
        let sum: usize = snap.status_counts.values().sum();
        assert_eq!(sum, snap.total_steps);
        assert_eq!(snap.completed_steps, 1);
        assert!((snap.progress_percentage - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_plan_progress_zero() {
        let plan = Plan::new("p1", "t", Vec::new());
        let snap = plan.snapshot();
        assert_eq!(snap.total_steps, 0);
        assert_eq!(snap.progress_percentage, 0.0);
    }
}
