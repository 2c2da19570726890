//! 计划作用域内容存储
//!
//! 目录约定：working_dir/plan-{plan_id}/agent-{agent}/{file_name}。
//! 写入先在内存缓冲、落到临时文件再原子重命名，并发读者不会观察到半个文件。
//! 溢出内容统一写到 agent-auto_store 作用域，相对路径因此带有 auto_ 标记，
//! 可与直接工具写入区分开。

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::core::AgentError;

/// 溢出内容使用的 agent 作用域名；相对路径包含 "auto_" 即视为自动存储条目
pub const AUTO_SCOPE: &str = "auto_store";

/// 存储条目元信息
#[derive(Clone, Debug)]
pub struct FileInfo {
    /// 相对计划目录的路径，如 agent-auto_store/plan_x_20250101_120000_42.md
    pub relative_path: String,
    pub size: u64,
    pub last_modified: String,
}

/// 内容存储：绑定根目录，按计划/agent 两级组织文件
#[derive(Clone, Debug)]
pub struct ContentStore {
    working_dir: PathBuf,
}

impl ContentStore {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn plan_dir(&self, plan_id: &str) -> PathBuf {
        self.working_dir.join(format!("plan-{}", plan_id))
    }

    pub fn agent_dir(&self, plan_id: &str, agent: &str) -> PathBuf {
        self.plan_dir(plan_id).join(format!("agent-{}", agent))
    }

    /// 文件名不允许携带目录成分，防止逃逸出 agent 目录
    fn sanitize_file_name(file_name: &str) -> Result<&str, AgentError> {
        let name = file_name.trim();
        if name.is_empty() {
            return Err(AgentError::StorageIo("file name is empty".to_string()));
        }
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(AgentError::StorageIo(format!(
                "invalid file name: {}",
                file_name
            )));
        }
        Ok(name)
    }

    pub fn file_path(
        &self,
        plan_id: &str,
        agent: &str,
        file_name: &str,
    ) -> Result<PathBuf, AgentError> {
        let name = Self::sanitize_file_name(file_name)?;
        Ok(self.agent_dir(plan_id, agent).join(name))
    }

    /// 覆盖写入：先写临时文件再重命名，保证读者只见完整内容
    pub fn write(
        &self,
        plan_id: &str,
        agent: &str,
        file_name: &str,
        content: &str,
    ) -> Result<PathBuf, AgentError> {
        let path = self.file_path(plan_id, agent, file_name)?;
        let dir = path
            .parent()
            .ok_or_else(|| AgentError::StorageIo("no parent directory".to_string()))?;
        fs::create_dir_all(dir).map_err(|e| AgentError::StorageIo(e.to_string()))?;

        let tmp = dir.join(format!(".{}.tmp", file_name));
        fs::write(&tmp, content).map_err(|e| AgentError::StorageIo(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| AgentError::StorageIo(e.to_string()))?;
        Ok(path)
    }

    /// 追加写入；文件不存在时创建。返回 (路径, 是否新建)
    pub fn append(
        &self,
        plan_id: &str,
        agent: &str,
        file_name: &str,
        content: &str,
    ) -> Result<(PathBuf, bool), AgentError> {
        let path = self.file_path(plan_id, agent, file_name)?;
        if !path.exists() {
            let path = self.write(plan_id, agent, file_name, content)?;
            return Ok((path, true));
        }
        let existing = fs::read_to_string(&path).map_err(|e| AgentError::StorageIo(e.to_string()))?;
        let merged = format!("{}\n{}", existing, content);
        let path = self.write(plan_id, agent, file_name, &merged)?;
        Ok((path, false))
    }

    /// 按相对路径读取计划目录下的文件
    pub fn read(&self, plan_id: &str, relative_path: &str) -> Result<String, AgentError> {
        if relative_path.contains("..") {
            return Err(AgentError::StorageIo(format!(
                "invalid relative path: {}",
                relative_path
            )));
        }
        let path = self.plan_dir(plan_id).join(relative_path);
        if !path.exists() {
            return Err(AgentError::ContentNotFound(relative_path.to_string()));
        }
        fs::read_to_string(&path).map_err(|e| AgentError::StorageIo(e.to_string()))
    }

    /// 枚举计划目录下的全部文件（递归），按相对路径排序
    pub fn list(&self, plan_id: &str) -> Vec<FileInfo> {
        let root = self.plan_dir(plan_id);
        let mut out = Vec::new();
        collect_files(&root, &root, &mut out);
        out.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        out
    }

    /// 只列出溢出（自动存储）条目
    pub fn list_auto(&self, plan_id: &str) -> Vec<FileInfo> {
        self.list(plan_id)
            .into_iter()
            .filter(|f| f.relative_path.contains("auto_"))
            .collect()
    }

    /// 删除计划的全部存储（显式清理，与计划生命周期绑定）
    pub fn cleanup_plan(&self, plan_id: &str) {
        let dir = self.plan_dir(plan_id);
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                tracing::warn!(plan_id = %plan_id, error = %e, "cleanup_plan failed");
            } else {
                tracing::info!(plan_id = %plan_id, "cleaned up plan storage");
            }
        }
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<FileInfo>) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        // 跳过隐藏文件与写入中的临时文件
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_files(root, &path, out);
        } else if let Ok(meta) = entry.metadata() {
            let relative_path = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let last_modified = meta
                .modified()
                .map(|t| {
                    let dt: DateTime<Local> = t.into();
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                })
                .unwrap_or_default();
            out.push(FileInfo {
                relative_path,
                size: meta.len(),
                last_modified,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        store.write("p1", "worker", "notes.md", "hello").unwrap();
        let content = store.read("p1", "agent-worker/notes.md").unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_append_creates_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let (_, created) = store.append("p1", "worker", "log.md", "first").unwrap();
        assert!(created);
        let (_, created) = store.append("p1", "worker", "log.md", "second").unwrap();
        assert!(!created);
        let content = store.read("p1", "agent-worker/log.md").unwrap();
        assert_eq!(content, "first\nsecond");
    }

    #[test]
    fn test_file_name_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        assert!(store.write("p1", "worker", "../escape.md", "x").is_err());
        assert!(store.write("p1", "worker", "a/b.md", "x").is_err());
        assert!(store.read("p1", "../outside").is_err());
    }

    #[test]
    fn test_list_and_auto_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        store.write("p1", "worker", "direct.md", "x").unwrap();
        store.write("p1", AUTO_SCOPE, "p1_x.md", "y").unwrap();
        store.write("p2", "worker", "other.md", "z").unwrap();

        let all = store.list("p1");
        assert_eq!(all.len(), 2);
        let auto = store.list_auto("p1");
        assert_eq!(auto.len(), 1);
        assert!(auto[0].relative_path.contains("auto_"));
    }

    #[test]
    fn test_cleanup_plan_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        store.write("p1", "worker", "f.md", "x").unwrap();
        store.cleanup_plan("p1");
        assert!(store.list("p1").is_empty());
        assert!(matches!(
            store.read("p1", "agent-worker/f.md"),
            Err(AgentError::ContentNotFound(_))
        ));
    }

    #[test]
    fn test_read_missing_is_content_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        assert!(matches!(
            store.read("p1", "agent-w/missing.md"),
            Err(AgentError::ContentNotFound(_))
        ));
    }
}
