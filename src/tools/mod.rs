//! 工具箱：注册表、执行器、入参解码与具体工具（storage / browser）

pub mod action;
pub mod executor;
pub mod registry;
pub mod storage_tool;

#[cfg(feature = "browser")]
pub mod browser;

pub use action::{decode_action, ActionTable, DecodedAction};
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry};
pub use storage_tool::StorageTool;

#[cfg(feature = "browser")]
pub use browser::BrowserTool;
