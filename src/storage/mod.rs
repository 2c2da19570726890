//! 存储层：计划作用域文件存储、溢出管理与内容检索

pub mod content_store;
pub mod overflow;
pub mod retrieval;

pub use content_store::{ContentStore, FileInfo, AUTO_SCOPE};
pub use overflow::{strip_stored_header, OverflowManager, ProcessedContent};
pub use retrieval::get_content;
