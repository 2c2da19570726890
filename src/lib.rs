//! Mantis - 计划执行引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **executor**: 步骤执行器抽象、注册表与 LLM 执行器
//! - **flow**: 计划起草与执行循环（编排入口）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: tracing 日志初始化
//! - **plan**: 计划数据模型、注册表与步骤状态机
//! - **server**: HTTP 端点（/chat、/status）
//! - **storage**: 计划作用域文件存储、溢出管理与内容检索
//! - **tools**: 工具箱（storage / browser）与执行器

pub mod config;
pub mod core;
pub mod executor;
pub mod flow;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod server;
pub mod storage;
pub mod tools;

pub use crate::core::AgentError;
