//! 内部存储工具
//!
//! 计划作用域的文件操作集合：append / replace / get_lines / list_contents / get_content。
//! 工具结果的大小上界由 ToolExecutor 的溢出管线统一保证，本工具只管读写；
//! get_content 取回的溢出全文同样会在返回路径上再次过溢出管线。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::storage::{get_content, ContentStore};
use crate::tools::action::{decode_action, ActionTable, DecodedAction};
use crate::tools::Tool;

/// 单次 get_lines 最多返回的行数
const MAX_LINES_PER_READ: usize = 300;

/// 存储工具入参：action 判别的标签联合，每个变体即一个操作
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StorageAction {
    /// 向文件追加内容（自动创建文件和目录）
    Append { file_name: String, content: String },
    /// 替换文件中的特定文本
    Replace {
        file_name: String,
        source_text: String,
        target_text: String,
    },
    /// 获取文件的指定行号范围内容，单次最多 300 行
    GetLines {
        file_name: String,
        start_line: Option<usize>,
        end_line: Option<usize>,
    },
    /// 列出当前计划相关的所有内容与摘要
    ListContents,
    /// 根据内容 ID（数字下标 / 名称子串 / "desc"）获取详细内容
    GetContent { content_id: String },
}

const KNOWN_ACTIONS: ActionTable = &[
    ("append", &["file_name", "content"]),
    ("replace", &["file_name", "source_text", "target_text"]),
    ("get_lines", &["file_name", "start_line", "end_line"]),
    ("list_contents", &[]),
    ("get_content", &["content_id"]),
];

/// 计划作用域的存储工具实例
pub struct StorageTool {
    store: ContentStore,
    plan_id: String,
    /// 直接写入使用的 agent 作用域
    agent: String,
}

impl StorageTool {
    pub fn new(store: ContentStore, plan_id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            store,
            plan_id: plan_id.into(),
            agent: agent.into(),
        }
    }

    fn append(&self, file_name: &str, content: &str) -> Result<String, String> {
        let (_, created) = self
            .store
            .append(&self.plan_id, &self.agent, file_name, content)
            .map_err(|e| e.to_string())?;
        if created {
            Ok(format!("File created with content: {}", file_name))
        } else {
            Ok(format!("Content appended: {}", file_name))
        }
    }

    fn replace(
        &self,
        file_name: &str,
        source_text: &str,
        target_text: &str,
    ) -> Result<String, String> {
        let relative = format!("agent-{}/{}", self.agent, file_name);
        let content = self
            .store
            .read(&self.plan_id, &relative)
            .map_err(|e| e.to_string())?;
        let replaced = content.replace(source_text, target_text);
        self.store
            .write(&self.plan_id, &self.agent, file_name, &replaced)
            .map_err(|e| e.to_string())?;
        Ok(format!("Text replaced in: {}", file_name))
    }

    fn get_lines(
        &self,
        file_name: &str,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> Result<String, String> {
        let relative = format!("agent-{}/{}", self.agent, file_name);
        let content = self
            .store
            .read(&self.plan_id, &relative)
            .map_err(|e| e.to_string())?;
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Ok("File is empty".to_string());
        }

        // 1 起始行号，默认整个文件；单次读取行数封顶
        let start = start_line.filter(|&s| s > 0).map(|s| s - 1).unwrap_or(0);
        let mut end = end_line
            .filter(|&e| e > 0)
            .map(|e| e.min(lines.len()))
            .unwrap_or(lines.len());
        if start >= lines.len() {
            return Err("start_line is beyond end of file".to_string());
        }
        if start >= end {
            return Err("start_line must be less than end_line".to_string());
        }
        if end - start > MAX_LINES_PER_READ {
            end = start + MAX_LINES_PER_READ;
        }

        let mut out = format!(
            "File: {} (lines {}-{} of {})\n{}\n",
            file_name,
            start + 1,
            end,
            lines.len(),
            "=".repeat(50)
        );
        for (i, line) in lines[start..end].iter().enumerate() {
            out.push_str(&format!("{:4}: {}\n", start + i + 1, line));
        }
        Ok(out)
    }

    fn list_contents(&self) -> Result<String, String> {
        let files = self.store.list(&self.plan_id);
        let auto_files = self.store.list_auto(&self.plan_id);

        if files.is_empty() {
            return Ok("No stored content for this plan".to_string());
        }

        let mut out = format!("Stored contents for plan {}:\n\n", self.plan_id);
        out.push_str("Files:\n");
        for (i, f) in files.iter().enumerate() {
            out.push_str(&format!(
                "  [{}] {} ({} bytes, {})\n",
                i + 1,
                f.relative_path,
                f.size,
                f.last_modified
            ));
        }
        if !auto_files.is_empty() {
            out.push_str("\nAuto-stored:\n");
            for (i, f) in auto_files.iter().enumerate() {
                out.push_str(&format!(
                    "  [auto_{}] {} ({} bytes, {})\n",
                    i + 1,
                    f.relative_path,
                    f.size,
                    f.last_modified
                ));
            }
        }
        out.push_str(
            "\nTips:\n  - use get_lines to read a file by name\n  - use get_content with an index, name substring, or \"desc\"",
        );
        Ok(out)
    }
}

#[async_trait]
impl Tool for StorageTool {
    fn name(&self) -> &str {
        "storage"
    }

    fn description(&self) -> &str {
        "Plan-scoped storage for large intermediate results. Actions: \
append (add content to a file), replace (substitute text in a file), \
get_lines (read a line range, max 300 lines), list_contents (list all stored \
entries and ids), get_content (fetch by content id, index, name substring, or \
\"desc\" for all auto-stored content). Oversized results are auto-stored and \
replaced by a summary with a retrievable content id."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(StorageAction))
            .unwrap_or_else(|_| serde_json::json!({}))
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let op = match decode_action::<StorageAction>(args, KNOWN_ACTIONS) {
            DecodedAction::Op(op) => op,
            DecodedAction::Unknown(a) => return Ok(format!("Unknown action: {}", a)),
            DecodedAction::Invalid(e) => return Err(e),
        };

        tracing::info!(plan_id = %self.plan_id, "storage tool execute");

        match op {
            StorageAction::Append { file_name, content } => self.append(&file_name, &content),
            StorageAction::Replace {
                file_name,
                source_text,
                target_text,
            } => self.replace(&file_name, &source_text, &target_text),
            StorageAction::GetLines {
                file_name,
                start_line,
                end_line,
            } => self.get_lines(&file_name, start_line, end_line),
            StorageAction::ListContents => self.list_contents(),
            StorageAction::GetContent { content_id } => {
                get_content(&self.store, &self.plan_id, &content_id).map_err(|e| e.to_string())
            }
        }
    }
}
