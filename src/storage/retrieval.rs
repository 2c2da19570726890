//! 存储内容检索
//!
//! selector 三种形态：字面量 "desc"（聚合内联全部自动存储条目）、1 起始的数字下标、
//! 条目名子串。可解析但越界的数字下标落回子串匹配，而不是立刻失败。

use crate::core::AgentError;
use crate::storage::content_store::ContentStore;

const FILE_RULE: &str = "==================================================";

/// 按 selector 取回存储内容；无匹配返回 ContentNotFound
pub fn get_content(
    store: &ContentStore,
    plan_id: &str,
    selector: &str,
) -> Result<String, AgentError> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(AgentError::ContentNotFound(
            "content selector is empty".to_string(),
        ));
    }

    if selector == "desc" {
        return aggregate_auto_contents(store, plan_id);
    }

    let files = store.list(plan_id);

    // 数字下标（1 起始）；越界不失败，落回子串匹配
    if let Ok(index) = selector.parse::<usize>() {
        if index >= 1 {
            if let Some(file) = files.get(index - 1) {
                let content = store.read(plan_id, &file.relative_path)?;
                return Ok(render_file(&file.relative_path, &content));
            }
        }
    }

    for file in &files {
        if file.relative_path.contains(selector) {
            let content = store.read(plan_id, &file.relative_path)?;
            return Ok(render_file(&file.relative_path, &content));
        }
    }

    Err(AgentError::ContentNotFound(format!(
        "no content matches '{}'; use list_contents to see available ids",
        selector
    )))
}

/// "desc"：把全部自动存储条目的全文内联拼接
fn aggregate_auto_contents(store: &ContentStore, plan_id: &str) -> Result<String, AgentError> {
    let auto_files = store.list_auto(plan_id);
    if auto_files.is_empty() {
        return Err(AgentError::ContentNotFound(
            "no auto-stored content for this plan".to_string(),
        ));
    }

    let mut out = format!("Auto-stored contents for plan {}:\n\n", plan_id);
    for file in &auto_files {
        match store.read(plan_id, &file.relative_path) {
            Ok(content) => {
                out.push_str(&format!("File: {}\n{}\n\n", file.relative_path, content));
            }
            Err(e) => {
                out.push_str(&format!("File: {} (unreadable: {})\n\n", file.relative_path, e));
            }
        }
    }
    Ok(out)
}

fn render_file(relative_path: &str, content: &str) -> String {
    format!("File: {}\n{}\n{}", relative_path, FILE_RULE, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::content_store::AUTO_SCOPE;

    fn seeded_store() -> (tempfile::TempDir, ContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        store.write("p1", AUTO_SCOPE, "p1_a.md", "spilled alpha").unwrap();
        store.write("p1", "worker", "report.md", "direct report").unwrap();
        (dir, store)
    }

    #[test]
    fn test_numeric_selector_one_based() {
        let (_dir, store) = seeded_store();
        // 排序后 agent-auto_store/... 在 agent-worker/... 之前
        let got = get_content(&store, "p1", "1").unwrap();
        assert!(got.contains("p1_a.md"));
        assert!(got.contains("spilled alpha"));
    }

    #[test]
    fn test_substring_selector() {
        let (_dir, store) = seeded_store();
        let got = get_content(&store, "p1", "report").unwrap();
        assert!(got.contains("direct report"));
    }

    #[test]
    fn test_out_of_range_numeric_falls_through_to_substring() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        store.write("p1", "worker", "99_summary.md", "named with digits").unwrap();
        // "99" 越界，但作为子串能匹配文件名
        let got = get_content(&store, "p1", "99").unwrap();
        assert!(got.contains("named with digits"));
    }

    #[test]
    fn test_desc_aggregates_auto_entries_only() {
        let (_dir, store) = seeded_store();
        let got = get_content(&store, "p1", "desc").unwrap();
        assert!(got.contains("spilled alpha"));
        assert!(!got.contains("direct report"));
    }

    #[test]
    fn test_no_match_is_content_not_found() {
        let (_dir, store) = seeded_store();
        assert!(matches!(
            get_content(&store, "p1", "zzz"),
            Err(AgentError::ContentNotFound(_))
        ));
        // 无自动条目的计划上 desc 也是 ContentNotFound
        assert!(matches!(
            get_content(&store, "p2", "desc"),
            Err(AgentError::ContentNotFound(_))
        ));
    }
}
