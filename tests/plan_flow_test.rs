//! 计划执行端到端测试
//!
//! 用脚本化 Mock LLM 驱动完整流程：起草 -> 逐步执行 -> 总结，
//! 覆盖溢出落盘、工具调用、重试封锁与取消路径。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use mantis::config::AppConfig;
use mantis::executor::{ExecutorRegistry, LlmStepExecutor, StepContext, StepExecutor, StepOutcome};
use mantis::flow::PlanningFlow;
use mantis::llm::{LlmClient, MockLlmClient};
use mantis::plan::{PlanStore, StepStatus};
use mantis::storage::{ContentStore, OverflowManager};
use mantis::tools::ToolExecutor;

fn build_flow(
    dir: &std::path::Path,
    llm: Arc<dyn LlmClient>,
    threshold: usize,
) -> (PlanningFlow, Arc<PlanStore>) {
    let cfg = AppConfig::default();
    let store = Arc::new(PlanStore::new());
    let mut executors = ExecutorRegistry::new(vec!["llm".to_string()]);
    executors.register("llm", Arc::new(LlmStepExecutor::new(llm.clone(), 4)));
    let overflow = Arc::new(OverflowManager::new(ContentStore::new(dir), threshold));
    let flow = PlanningFlow::new(store.clone(), llm, Arc::new(executors), overflow, &cfg);
    (flow, store)
}

#[tokio::test]
async fn test_full_run_with_drafted_plan() {
    let dir = tempfile::tempdir().unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"title": "Demo plan", "steps": ["first", "second"]}"#,
        "first step done",
        "second step done",
        "Both steps executed successfully.",
    ]));
    let (flow, store) = build_flow(dir.path(), llm, 300);

    let result = flow
        .execute("plan_t1", "run the demo", CancellationToken::new())
        .await;

    assert!(result.contains("first step done"));
    assert!(result.contains("second step done"));
    assert!(result.contains("Plan completed:"));
    assert!(result.contains("Both steps executed successfully."));

    let snapshot = store.snapshot("plan_t1").unwrap();
    assert_eq!(snapshot.total_steps, 2);
    assert_eq!(snapshot.completed_steps, 2);
    assert!((snapshot.progress_percentage - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_draft_failure_uses_default_plan() {
    let dir = tempfile::tempdir().unwrap();
    // 起草产出不可解析 -> 默认三步计划；随后三步 + 总结
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responses(vec![
        "no json here, sorry",
        "analyzed",
        "executed",
        "verified",
        "All good.",
    ]));
    let (flow, store) = build_flow(dir.path(), llm, 300);

    let result = flow
        .execute("plan_t2", "do something", CancellationToken::new())
        .await;

    assert!(result.contains("Plan completed:"));
    let plan = store.get_plan("plan_t2").unwrap();
    assert_eq!(plan.title, "Plan for: do something");
    assert_eq!(
        plan.steps,
        vec!["Analyze request", "Execute task", "Verify results"]
    );
}

#[tokio::test]
async fn test_tool_call_result_spills_to_storage() {
    let dir = tempfile::tempdir().unwrap();
    let long_line = "x".repeat(120);
    // 先 append 一个大文件（确认文本很短，不触发溢出），再整读该文件：
    // 读取结果超过阈值，应被溢出管线替换为摘要并落盘
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"title": "Spill", "steps": ["write and read big file"]}"#.to_string(),
        format!(
            r#"{{"tool": "storage", "args": {{"action": "append", "file_name": "big.txt", "content": "{}"}}}}"#,
            long_line
        ),
        r#"{"tool": "storage", "args": {"action": "get_lines", "file_name": "big.txt"}}"#
            .to_string(),
        "stored the content".to_string(),
        "Done.".to_string(),
    ]));
    let (flow, _) = build_flow(dir.path(), llm, 80);

    let result = flow
        .execute("plan_t3", "spill test", CancellationToken::new())
        .await;
    assert!(result.contains("Plan completed:"));

    // 工具结果超过 80 字符阈值，应已自动落盘到 agent-auto_store
    let auto_dir = dir
        .path()
        .join("plan-plan_t3")
        .join("agent-auto_store");
    assert!(auto_dir.exists());
    let spilled: Vec<_> = std::fs::read_dir(&auto_dir).unwrap().collect();
    assert_eq!(spilled.len(), 1);

    // 用户文件本身也写到了 plan 作用域下
    let user_file = dir
        .path()
        .join("plan-plan_t3")
        .join("agent-default-agent")
        .join("big.txt");
    assert!(user_file.exists());
}

#[tokio::test]
async fn test_failing_llm_blocks_steps_and_degrades_summary() {
    let dir = tempfile::tempdir().unwrap();
    // 起草失败 -> 默认计划；执行全程失败 -> 每步重试 3 次后 Blocked；总结失败 -> 固定文案
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::failing());
    let (flow, store) = build_flow(dir.path(), llm, 300);

    let result = flow
        .execute("plan_t4", "hopeless", CancellationToken::new())
        .await;

    assert!(result.contains("retries exhausted"));
    assert!(result.contains("Plan completed:"));
    assert!(result.contains("Plan completed; summary unavailable"));

    let snapshot = store.snapshot("plan_t4").unwrap();
    assert_eq!(snapshot.total_steps, 3);
    assert_eq!(
        snapshot.status_counts.get(&StepStatus::Blocked).copied(),
        Some(3)
    );
    assert_eq!(snapshot.completed_steps, 0);
}

#[tokio::test]
async fn test_cancellation_stops_before_first_step() {
    let dir = tempfile::tempdir().unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"title": "Cancelled", "steps": ["never runs"]}"#,
    ]));
    let (flow, store) = build_flow(dir.path(), llm, 300);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = flow.execute("plan_t5", "abort me", CancellationToken::new().child_token()).await;
    // 未取消的运行正常收尾（脚本耗尽后 Mock 回显，也会被当作步骤结果）
    assert!(result.contains("Plan completed:"));

    let cancelled = flow.execute("plan_t6", "", cancel).await;
    // 空请求且计划不存在 -> 直接失败文本，不进入循环
    assert!(cancelled.contains("Failed to create plan"));
    assert!(store.snapshot("plan_t6").is_err());
}

#[tokio::test]
async fn test_cancellation_mid_plan_leaves_remaining_steps() {
    let dir = tempfile::tempdir().unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responses(vec!["step one ok"]));
    let (flow, store) = build_flow(dir.path(), llm, 300);

    // 预先登记计划并取消：循环入口即检测到取消，不执行任何步骤
    store
        .create_plan("plan_t7", "Pre-registered", vec!["a".into(), "b".into()])
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = flow.execute("plan_t7", "", cancel).await;

    assert!(result.contains("Execution cancelled."));
    let snapshot = store.snapshot("plan_t7").unwrap();
    assert_eq!(snapshot.completed_steps, 0);
}

#[tokio::test]
async fn test_plan_status_for_unknown_plan_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new());
    let (flow, _) = build_flow(dir.path(), llm, 300);

    assert!(flow.plan_status("no-such-plan").is_none());
}

#[tokio::test]
async fn test_cleanup_releases_plan_and_files() {
    let dir = tempfile::tempdir().unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"title": "Cleanup", "steps": ["only step"]}"#,
        "done",
        "Summary.",
    ]));
    let (flow, store) = build_flow(dir.path(), llm, 300);

    flow.execute("plan_t8", "cleanup test", CancellationToken::new())
        .await;
    assert!(store.contains("plan_t8"));

    flow.cleanup("plan_t8");
    assert!(!store.contains("plan_t8"));
    assert!(!dir.path().join("plan-plan_t8").exists());
}

/// 卡在闸门上的执行器，用于让一次运行停在步骤执行中
struct GatedExecutor {
    gate: Arc<tokio::sync::Notify>,
}

#[async_trait::async_trait]
impl StepExecutor for GatedExecutor {
    fn name(&self) -> &str {
        "gated"
    }

    async fn execute_step(&self, _ctx: &StepContext, _tools: &ToolExecutor) -> StepOutcome {
        self.gate.notified().await;
        StepOutcome::Completed("gated step done".to_string())
    }
}

#[tokio::test]
async fn test_cleanup_during_run_is_deferred() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = AppConfig::default();
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responses(vec!["Summary."]));
    let store = Arc::new(PlanStore::new());
    let gate = Arc::new(tokio::sync::Notify::new());
    let mut executors = ExecutorRegistry::new(vec!["gated".to_string()]);
    executors.register("gated", Arc::new(GatedExecutor { gate: gate.clone() }));
    let overflow = Arc::new(OverflowManager::new(ContentStore::new(dir.path()), 300));
    let flow = Arc::new(PlanningFlow::new(
        store.clone(),
        llm,
        Arc::new(executors),
        overflow,
        &cfg,
    ));

    store
        .create_plan("plan_c1", "Gated", vec!["wait at the gate".into()])
        .unwrap();
    let run = {
        let flow = flow.clone();
        tokio::spawn(async move { flow.execute("plan_c1", "", CancellationToken::new()).await })
    };

    // 等到步骤真正进入执行中再发清理请求
    let mut in_progress = false;
    for _ in 0..200 {
        if let Ok(snap) = store.snapshot("plan_c1") {
            if snap.status_counts[&StepStatus::InProgress] == 1 {
                in_progress = true;
                break;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(in_progress);

    // 运行中的计划不被动刀：清理延迟，计划与文件保持可用
    flow.cleanup("plan_c1");
    assert!(store.contains("plan_c1"));

    gate.notify_one();
    let result = run.await.unwrap();
    assert!(result.contains("gated step done"));
    assert!(result.contains("Plan completed:"));
    // 运行结束时兑现延迟的清理
    assert!(!store.contains("plan_c1"));
    assert!(!dir.path().join("plan-plan_c1").exists());
}

#[tokio::test]
async fn test_empty_registry_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = AppConfig::default();
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"title": "Nobody home", "steps": ["a", "b"]}"#,
    ]));
    let store = Arc::new(PlanStore::new());
    let executors = ExecutorRegistry::new(vec!["llm".to_string()]);
    let overflow = Arc::new(OverflowManager::new(ContentStore::new(dir.path()), 300));
    let flow = PlanningFlow::new(store.clone(), llm, Arc::new(executors), overflow, &cfg);

    let result = flow
        .execute("plan_e1", "anything", CancellationToken::new())
        .await;

    // 注册表为空是运行级失败，不是把每一步逐个封锁后再「完成」
    assert!(result.contains("Execution error: No executor available"));
    assert!(!result.contains("Plan completed:"));
    let snap = store.snapshot("plan_e1").unwrap();
    assert_eq!(snap.status_counts[&StepStatus::Blocked], 0);
}

/// 步骤 tag 命中注册表时选择对应执行器而不是回退
struct TaggedProbe {
    name: &'static str,
}

#[async_trait::async_trait]
impl StepExecutor for TaggedProbe {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute_step(&self, _ctx: &StepContext, _tools: &ToolExecutor) -> StepOutcome {
        StepOutcome::Completed(format!("handled by {}", self.name))
    }
}

#[tokio::test]
async fn test_tagged_step_routes_to_matching_executor() {
    let dir = tempfile::tempdir().unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responses(vec![
        r#"{"title": "Routing", "steps": ["[PROBE] special step", "normal step"]}"#,
        "Summary.",
    ]));

    let cfg = AppConfig::default();
    let store = Arc::new(PlanStore::new());
    let mut executors = ExecutorRegistry::new(vec!["probe".to_string()]);
    executors.register("probe", Arc::new(TaggedProbe { name: "probe" }));
    executors.register("fallback", Arc::new(TaggedProbe { name: "fallback" }));
    let overflow = Arc::new(OverflowManager::new(ContentStore::new(dir.path()), 300));
    let flow = PlanningFlow::new(store, llm, Arc::new(executors), overflow, &cfg);

    let result = flow
        .execute("plan_t9", "routing test", CancellationToken::new())
        .await;

    // 带 [PROBE] 标记的步骤走 probe，无标记步骤按回退顺序也落到 probe
    assert!(result.contains("handled by probe"));
    assert!(!result.contains("handled by fallback"));
    assert!(result.contains("Plan completed:"));
}
