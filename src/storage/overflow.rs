//! 溢出管理器
//!
//! 所有工具的文本结果在回到计划/执行器层之前都要经过 process：
//! 未超过阈值原样放行；超过阈值则落盘到 Content Store 并换成「已存储提示 + 内容 ID + 前 5 行预览」。
//! 写盘失败时退化为按阈值截断的内容，此调用永不向上抛错——执行循环的前向推进不依赖存储可用。

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Local;

use crate::storage::content_store::{ContentStore, AUTO_SCOPE};

/// 预览行数
const PREVIEW_LINES: usize = 5;
/// 预览单行最大字符数
const PREVIEW_LINE_CHARS: usize = 80;
/// 存储文件头部分隔线
const HEADER_RULE: &str =
    "============================================================";

/// process 的结果：摘要（或原文）、可检索的内容 ID、是否落盘
#[derive(Clone, Debug)]
pub struct ProcessedContent {
    pub summary: String,
    pub content_id: Option<String>,
    pub stored: bool,
}

impl ProcessedContent {
    fn passthrough(content: impl Into<String>) -> Self {
        Self {
            summary: content.into(),
            content_id: None,
            stored: false,
        }
    }
}

/// 溢出管理器：持有 Content Store 与阈值（全局默认 + 按计划覆盖）
pub struct OverflowManager {
    store: ContentStore,
    default_threshold: usize,
    plan_thresholds: RwLock<HashMap<String, usize>>,
}

impl OverflowManager {
    pub fn new(store: ContentStore, default_threshold: usize) -> Self {
        Self {
            store,
            default_threshold,
            plan_thresholds: RwLock::new(HashMap::new()),
        }
    }

    /// 按计划覆盖阈值
    pub fn set_threshold(&self, plan_id: &str, threshold: usize) {
        self.plan_thresholds
            .write()
            .unwrap()
            .insert(plan_id.to_string(), threshold);
    }

    /// 移除按计划的阈值覆盖（计划资源释放时调用）
    pub fn clear_threshold(&self, plan_id: &str) {
        self.plan_thresholds.write().unwrap().remove(plan_id);
    }

    pub fn threshold_for(&self, plan_id: &str) -> usize {
        self.plan_thresholds
            .read()
            .unwrap()
            .get(plan_id)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    /// 阈值判定与落盘；plan_id 为 None 或内容为空时原样放行
    pub fn process(&self, content: &str, plan_id: Option<&str>) -> ProcessedContent {
        let plan_id = match plan_id {
            Some(p) if !p.is_empty() => p,
            _ => return ProcessedContent::passthrough(content),
        };
        if content.is_empty() {
            return ProcessedContent::passthrough(content);
        }

        let threshold = self.threshold_for(plan_id);
        let len = content.chars().count();
        // 恰好等于阈值不触发存储
        if len <= threshold {
            return ProcessedContent::passthrough(content);
        }

        let content_id = generate_content_id(plan_id);
        let file_name = format!("{}.md", content_id);
        let stored_body = render_stored_content(content, &content_id, len);

        match self.store.write(plan_id, AUTO_SCOPE, &file_name, &stored_body) {
            Ok(path) => {
                tracing::info!(
                    plan_id = %plan_id,
                    content_id = %content_id,
                    chars = len,
                    path = %path.display(),
                    "content exceeded threshold, spilled to storage"
                );
                ProcessedContent {
                    summary: render_summary(content, &content_id),
                    content_id: Some(content_id),
                    stored: true,
                }
            }
            Err(e) => {
                tracing::error!(plan_id = %plan_id, error = %e, "spill failed, truncating instead");
                let truncated: String = content.chars().take(threshold).collect();
                ProcessedContent::passthrough(format!(
                    "{}\n\n... (content truncated)",
                    truncated
                ))
            }
        }
    }

    pub fn content_store(&self) -> &ContentStore {
        &self.store
    }
}

/// 内容 ID：{plan_id}_{yyyymmdd_hhmmss}_{0..999}
fn generate_content_id(plan_id: &str) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let suffix = (uuid::Uuid::new_v4().as_u128() % 1000) as u32;
    format!("{}_{}_{}", plan_id, timestamp, suffix)
}

/// 带元信息头的落盘全文
fn render_stored_content(content: &str, content_id: &str, original_chars: usize) -> String {
    format!(
        "{rule}\nAUTO-STORED CONTENT\n{rule}\nGenerated: {}\nContent ID: {}\nOriginal length: {} chars\n{rule}\n\n{}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        content_id,
        original_chars,
        content,
        rule = HEADER_RULE,
    )
}

/// 去掉元信息头，取回原始内容；不是溢出文件格式时原样返回
pub fn strip_stored_header(stored: &str) -> &str {
    let marker = format!("{}\n\n", HEADER_RULE);
    if stored.starts_with(HEADER_RULE) {
        if let Some(idx) = stored.find(&marker) {
            return &stored[idx + marker.len()..];
        }
    }
    stored
}

/// 摘要：固定提示 + 内容 ID + 前 5 行预览（每行截断到 80 字符）
fn render_summary(content: &str, content_id: &str) -> String {
    let mut summary = String::new();
    summary.push_str(
        "- Operation succeeded but the result was too long, so the full content was stored. \
Use the storage tool (list_contents / get_content) to retrieve it.\n",
    );
    summary.push_str(&format!("- Stored content id: {}\n", content_id));

    let lines: Vec<&str> = content.lines().collect();
    let preview_count = lines.len().min(PREVIEW_LINES);
    summary.push_str(&format!("- Preview (first {} lines):\n", preview_count));
    for line in lines.iter().take(preview_count) {
        let line = line.trim();
        if line.chars().count() > PREVIEW_LINE_CHARS {
            let cut: String = line.chars().take(PREVIEW_LINE_CHARS).collect();
            summary.push_str(&format!("    {}...\n", cut));
        } else {
            summary.push_str(&format!("    {}\n", line));
        }
    }
    if lines.len() > preview_count {
        summary.push_str("    ...\n");
    }
    summary
}
