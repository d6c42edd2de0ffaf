//! 编排层
//!
//! 阶段预约、批次调度、进度合并、状态落定都在这一层。
//! 对外只暴露 `QuizPipeline` 和各阶段的结果类型；
//! 对内依赖 store 的条件更新和 clients 的窄接口。

pub mod batch_tracker;
pub mod export;
pub mod extraction;
pub mod generation;
pub mod pipeline;
pub mod reservation;

pub use export::{ExportOutcome, ExportStage};
pub use extraction::{ExtractionOutcome, ExtractionStage};
pub use generation::{GenerationOutcome, GenerationStage};
pub use pipeline::QuizPipeline;
pub use reservation::{ReservationGuard, Stage};
