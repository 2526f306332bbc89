//! 编排层：主循环与过程事件

pub mod events;
pub mod loop_;

pub use events::RunEvent;
pub use loop_::{run_loop, LoopOutcome, RunSession, RunSettings};
