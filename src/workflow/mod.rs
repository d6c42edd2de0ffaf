//! 工作流层
//!
//! 单个批次的完整生成路径（prompt → LLM → 解析 → 校验 → 计数）。
//! 不碰 store，不做并发调度，那些是编排层的事。

pub mod batch_ctx;
pub mod batch_flow;

pub use batch_ctx::BatchCtx;
pub use batch_flow::{BatchFailure, BatchFlow, BatchOutcome};
