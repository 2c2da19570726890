//! 计划层：数据模型、注册表与步骤状态机

pub mod state;
pub mod store;
pub mod types;

pub use state::{render_plan_text, select_current_step, SelectedStep};
pub use store::PlanStore;
pub use types::{parse_step_tag, Plan, PlanStatusSnapshot, Step, StepStatus};
