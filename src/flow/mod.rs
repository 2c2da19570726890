//! 编排层：计划起草与执行循环

pub mod drafter;
pub mod loop_;

pub use drafter::PlanDrafter;
pub use loop_::PlanningFlow;
