//! Browser 工具：使用 Headless Chrome 驱动浏览器
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! 计划级会话：首次 navigate 时创建，同一计划的后续步骤复用同一 Tab，
//! 计划完成或中止时由 cleanup 显式拆除，不跨计划共享。
//! 结果文本的大小上界由 ToolExecutor 的溢出管线保证。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use headless_chrome::{Browser, Tab};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::action::{decode_action, ActionTable, DecodedAction};
use crate::tools::Tool;

/// 浏览器工具入参
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BrowserAction {
    /// 打开 URL（创建或复用本计划的会话）
    Navigate { url: String },
    /// 提取当前页面（或指定 CSS 选择器元素）的可读文本
    GetText { selector: Option<String> },
    /// 点击匹配 CSS 选择器的元素
    Click { selector: String },
    /// 向匹配 CSS 选择器的输入框输入文本
    InputText { selector: String, text: String },
    /// 滚动页面，direction 为 up / down
    Scroll { direction: Option<String> },
}

const KNOWN_ACTIONS: ActionTable = &[
    ("navigate", &["url"]),
    ("get_text", &["selector"]),
    ("click", &["selector"]),
    ("input_text", &["selector", "text"]),
    ("scroll", &["direction"]),
];

/// 计划级浏览器会话
struct BrowserSession {
    /// 持有 Browser 保活；Tab 随 Browser 一起销毁
    _browser: Browser,
    tab: Arc<Tab>,
    current_url: String,
}

/// 从 URL 提取域名（小写）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

/// Browser 工具：action 判别的页面操作集合，会话与计划同生命周期
pub struct BrowserTool {
    plan_id: String,
    allowed_domains: HashSet<String>,
    session: Arc<Mutex<Option<BrowserSession>>>,
}

impl BrowserTool {
    pub fn new(plan_id: impl Into<String>, allowed_domains: Vec<String>) -> Self {
        let allowed_domains = allowed_domains
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        Self {
            plan_id: plan_id.into(),
            allowed_domains,
            session: Arc::new(Mutex::new(None)),
        }
    }

    fn is_allowed(&self, url: &str) -> Result<(), String> {
        if self.allowed_domains.is_empty() {
            return Ok(());
        }
        let domain =
            extract_domain(url).ok_or_else(|| format!("Invalid URL: {}", url))?;
        if self.allowed_domains.contains(&domain) {
            Ok(())
        } else {
            Err(format!("Access restricted: domain {} not in allowlist", domain))
        }
    }

    fn navigate(&self, url: &str) -> Result<String, String> {
        self.is_allowed(url)?;
        let session_arc = Arc::clone(&self.session);
        let url = url.to_string();

        let mut guard = session_arc.lock().map_err(|e| e.to_string())?;
        if guard.is_none() {
            let browser = Browser::default()
                .map_err(|e| format!("Chrome launch failed: {}. Install Chrome/Chromium.", e))?;
            let tab = browser
                .new_tab()
                .map_err(|e| format!("Browser tab failed: {}", e))?;
            *guard = Some(BrowserSession {
                _browser: browser,
                tab,
                current_url: String::new(),
            });
        }
        let session = guard.as_mut().expect("session just created");
        session
            .tab
            .navigate_to(&url)
            .map_err(|e| format!("Navigate failed: {}", e))?;
        session
            .tab
            .wait_for_element("body")
            .map_err(|e| format!("Page load failed: {}", e))?;
        session.current_url = url.clone();
        Ok(format!("Navigated to {}", url))
    }

    fn with_session<T>(
        &self,
        f: impl FnOnce(&BrowserSession) -> Result<T, String>,
    ) -> Result<T, String> {
        let guard = self.session.lock().map_err(|e| e.to_string())?;
        let session = guard
            .as_ref()
            .ok_or_else(|| "No active browser session. Use navigate first.".to_string())?;
        f(session)
    }

    fn get_text(&self, selector: Option<&str>) -> Result<String, String> {
        self.with_session(|session| {
            if let Some(sel) = selector {
                let el = session
                    .tab
                    .wait_for_element(sel)
                    .map_err(|e| format!("Element not found: {}", e))?;
                el.get_inner_text()
                    .map_err(|e| format!("Get text failed: {}", e))
            } else {
                let content = session
                    .tab
                    .get_content()
                    .map_err(|e| format!("Get content failed: {}", e))?;
                Ok(html2text::from_read(content.as_bytes(), 120).unwrap_or(content))
            }
        })
    }

    fn click(&self, selector: &str) -> Result<String, String> {
        self.with_session(|session| {
            let el = session
                .tab
                .wait_for_element(selector)
                .map_err(|e| format!("Element not found: {}", e))?;
            el.click().map_err(|e| format!("Click failed: {}", e))?;
            Ok(format!("Clicked {}", selector))
        })
    }

    fn input_text(&self, selector: &str, text: &str) -> Result<String, String> {
        self.with_session(|session| {
            let el = session
                .tab
                .wait_for_element(selector)
                .map_err(|e| format!("Element not found: {}", e))?;
            el.click().map_err(|e| format!("Focus failed: {}", e))?;
            session
                .tab
                .type_str(text)
                .map_err(|e| format!("Type failed: {}", e))?;
            Ok(format!("Typed into {}", selector))
        })
    }

    fn scroll(&self, direction: Option<&str>) -> Result<String, String> {
        self.with_session(|session| {
            let direction = direction.unwrap_or("down");
            let amount = if direction == "up" { -500 } else { 500 };
            let js = format!("window.scrollBy(0, {})", amount);
            session
                .tab
                .evaluate(&js, false)
                .map_err(|e| format!("Scroll failed: {}", e))?;
            Ok(format!("Scrolled {}", direction))
        })
    }
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "browser"
    }

    fn description(&self) -> &str {
        "Control a headless browser bound to this plan. Actions: navigate (open a URL), \
get_text (extract readable text of the page or a CSS selector), click, \
input_text, scroll. The session persists across steps of the same plan."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(BrowserAction))
            .unwrap_or_else(|_| serde_json::json!({}))
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let op = match decode_action::<BrowserAction>(args, KNOWN_ACTIONS) {
            DecodedAction::Op(op) => op,
            DecodedAction::Unknown(a) => return Ok(format!("Unknown action: {}", a)),
            DecodedAction::Invalid(e) => return Err(e),
        };

        tracing::info!(plan_id = %self.plan_id, "browser tool execute");

        // headless_chrome 是阻塞 API，放到 blocking 线程
        match op {
            BrowserAction::Navigate { url } => {
                let tool = self.clone_shallow();
                tokio::task::spawn_blocking(move || tool.navigate(&url))
                    .await
                    .map_err(|e| format!("Task join: {}", e))?
            }
            BrowserAction::GetText { selector } => {
                let tool = self.clone_shallow();
                tokio::task::spawn_blocking(move || tool.get_text(selector.as_deref()))
                    .await
                    .map_err(|e| format!("Task join: {}", e))?
            }
            BrowserAction::Click { selector } => {
                let tool = self.clone_shallow();
                tokio::task::spawn_blocking(move || tool.click(&selector))
                    .await
                    .map_err(|e| format!("Task join: {}", e))?
            }
            BrowserAction::InputText { selector, text } => {
                let tool = self.clone_shallow();
                tokio::task::spawn_blocking(move || tool.input_text(&selector, &text))
                    .await
                    .map_err(|e| format!("Task join: {}", e))?
            }
            BrowserAction::Scroll { direction } => {
                let tool = self.clone_shallow();
                tokio::task::spawn_blocking(move || tool.scroll(direction.as_deref()))
                    .await
                    .map_err(|e| format!("Task join: {}", e))?
            }
        }
    }

    /// 拆除本计划的浏览器会话
    async fn cleanup(&self) {
        let session_arc = Arc::clone(&self.session);
        let plan_id = self.plan_id.clone();
        let _ = tokio::task::spawn_blocking(move || {
            if let Ok(mut guard) = session_arc.lock() {
                if guard.take().is_some() {
                    tracing::info!(plan_id = %plan_id, "browser session torn down");
                }
            }
        })
        .await;
    }
}

impl BrowserTool {
    /// 共享会话的浅克隆，供 spawn_blocking 闭包移动
    fn clone_shallow(&self) -> Self {
        Self {
            plan_id: self.plan_id.clone(),
            allowed_domains: self.allowed_domains.clone(),
            session: Arc::clone(&self.session),
        }
    }
}
