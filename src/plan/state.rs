//! 步骤状态机与计划文本渲染
//!
//! select_current_step 是纯逻辑：按下标顺序扫描，返回第一个处于 Active 集合的步骤；
//! 选中 NotStarted 步骤时顺手迁移为 InProgress（已是 InProgress 则幂等）。
//! 全部步骤为 Completed / Blocked 时返回 None，这是执行循环的唯一正常终止信号。
//! Blocked 步骤不会被自动选中或自动解除，解除需要外部显式改状态。

use crate::plan::types::{Plan, PlanStatusSnapshot, StepStatus};

/// 被选中的当前步骤
#[derive(Clone, Debug)]
pub struct SelectedStep {
    pub index: usize,
    pub text: String,
    /// 执行器类型标记（创建时解析）
    pub tag: Option<String>,
}

/// 选出最低下标的 Active 步骤并置为 InProgress；无 Active 步骤返回 None
pub fn select_current_step(plan: &mut Plan) -> Option<SelectedStep> {
    for i in 0..plan.steps.len() {
        if plan.status_at(i).is_active() {
            plan.set_status(i, StepStatus::InProgress);
            return Some(SelectedStep {
                index: i,
                text: plan.steps[i].clone(),
                tag: plan.tags.get(i).cloned().flatten(),
            });
        }
    }
    None
}

/// 渲染计划全文：标题、进度、状态统计、带标记的步骤清单与备注
pub fn render_plan_text(snapshot: &PlanStatusSnapshot) -> String {
    let header = format!("Plan: {} (ID: {})", snapshot.title, snapshot.plan_id);
    let mut text = String::new();
    text.push_str(&header);
    text.push('\n');
    text.push_str(&"=".repeat(header.chars().count()));
    text.push_str("\n\n");

    text.push_str(&format!(
        "Progress: {}/{} steps completed ({:.1}%)\n",
        snapshot.completed_steps, snapshot.total_steps, snapshot.progress_percentage
    ));
    text.push_str(&format!(
        "Status: {} completed, {} in progress, {} blocked, {} not started\n\n",
        snapshot.status_counts[&StepStatus::Completed],
        snapshot.status_counts[&StepStatus::InProgress],
        snapshot.status_counts[&StepStatus::Blocked],
        snapshot.status_counts[&StepStatus::NotStarted],
    ));

    text.push_str("Steps:\n");
    for (i, step) in snapshot.steps.iter().enumerate() {
        text.push_str(&format!("{}. {} {}\n", i, step.status.mark(), step.text));
        if !step.notes.is_empty() {
            text.push_str(&format!("   Notes: {}\n", step.notes));
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::types::Plan;

    fn plan_with_statuses(statuses: &[StepStatus]) -> Plan {
        let steps = (0..statuses.len()).map(|i| format!("step {}", i)).collect();
        let mut plan = Plan::new("p1", "test", steps);
        for (i, s) in statuses.iter().enumerate() {
            plan.set_status(i, *s);
        }
        plan
    }

    #[test]
    fn test_selects_first_active_step() {
        // 前两步已完成，第一个 Active 状态出现在下标 2
        let mut plan = plan_with_statuses(&[
            StepStatus::Completed,
            StepStatus::Completed,
            StepStatus::InProgress,
            StepStatus::NotStarted,
        ]);
        let sel = select_current_step(&mut plan).unwrap();
        assert_eq!(sel.index, 2);
    }

    #[test]
    fn test_selection_flips_not_started_to_in_progress() {
        let mut plan = Plan::new(
            "p1",
            "t",
            vec![
                "Analyze request".into(),
                "Execute task".into(),
                "Verify results".into(),
            ],
        );
        let sel = select_current_step(&mut plan).unwrap();
        assert_eq!(sel.index, 0);
        assert_eq!(sel.text, "Analyze request");
        assert_eq!(plan.status_at(0), StepStatus::InProgress);

        plan.set_status(0, StepStatus::Completed);
        let sel = select_current_step(&mut plan).unwrap();
        assert_eq!(sel.index, 1);
        assert_eq!(sel.text, "Execute task");
    }

    #[test]
    fn test_blocked_steps_are_skipped() {
        let mut plan = plan_with_statuses(&[
            StepStatus::Blocked,
            StepStatus::NotStarted,
        ]);
        let sel = select_current_step(&mut plan).unwrap();
        assert_eq!(sel.index, 1);
    }

    #[test]
    fn test_none_when_no_active_step() {
        let mut plan = plan_with_statuses(&[StepStatus::Completed, StepStatus::Blocked]);
        assert!(select_current_step(&mut plan).is_none());
    }

    #[test]
    fn test_selection_carries_tag() {
        let mut plan = Plan::new("p1", "t", vec!["[BROWSER] open docs".into()]);
        let sel = select_current_step(&mut plan).unwrap();
        assert_eq!(sel.tag.as_deref(), Some("browser"));
    }

    #[test]
    fn test_render_plan_text() {
        let mut plan = plan_with_statuses(&[StepStatus::Completed, StepStatus::InProgress]);
        plan.set_note(0, "done early");
        let text = render_plan_text(&plan.snapshot());
        assert!(text.contains("Plan: test (ID: p1)"));
        assert!(text.contains("Progress: 1/2 steps completed (50.0%)"));
        assert!(text.contains("0. [✓] step 0"));
        assert!(text.contains("   Notes: done early"));
        assert!(text.contains("1. [→] step 1"));
    }
}
