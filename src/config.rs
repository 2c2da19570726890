//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MANTIS__*` 覆盖（双下划线表示嵌套，如 `MANTIS__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub flow: FlowSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub server: ServerSection,
}

/// [app] 段：应用名与计划工作目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 计划文件根目录，未设置时用 ./workspace
    pub working_dir: Option<PathBuf>,
    /// 直接工具写入使用的 agent 作用域名称
    pub agent_name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            working_dir: None,
            agent_name: "default-agent".to_string(),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock；无 API Key 时自动退回 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            request_timeout_secs: 60,
        }
    }
}

/// [flow] 段：执行循环参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowSection {
    /// 同一步骤可重试失败的次数上限，超过后标记 Blocked
    pub max_step_retries: usize,
    /// 执行器回退顺序：步骤 tag 未命中注册表时按此顺序取第一个存在的执行器
    pub executor_fallback: Vec<String>,
    /// 单个执行器内部的工具调用轮数上限
    pub max_tool_rounds: usize,
}

impl Default for FlowSection {
    fn default() -> Self {
        Self {
            max_step_retries: 3,
            executor_fallback: vec!["llm".to_string()],
            max_tool_rounds: 8,
        }
    }
}

/// [storage] 段：溢出阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// 工具结果超过此字符数时自动落盘并返回摘要；等于阈值不触发
    pub content_threshold: usize,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            content_threshold: 300,
        }
    }
}

/// [tools] 段：工具超时与浏览器白名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 浏览器允许访问的域名；空表示不限
    pub allowed_domains: Vec<String>,
    /// 浏览器单次返回的最大字符数
    pub max_result_chars: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            allowed_domains: Vec::new(),
            max_result_chars: 8000,
        }
    }
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            flow: FlowSection::default(),
            storage: StorageSection::default(),
            tools: ToolsSection::default(),
            server: ServerSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MANTIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MANTIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MANTIS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
