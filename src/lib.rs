//! # Quiz Pipeline
//!
//! 从课程内容自动生成测验并导出到 Canvas 的流水线
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Clients / Store）
//! - `clients/` - 外部协作方的窄接口和真实实现
//! - `LlmClient` - async-openai 封装，错误按可重试/严重分类
//! - `CanvasClient` - 内容提取 / 建壳 / 逐题导出 / 回滚删除
//! - `store/` - Quiz 持久化契约，`try_transition` 是唯一的事务边界
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 无状态的单一职责能力
//! - `PromptService` - 按题型构建生成/纠错 prompt
//! - `parser` - 从 LLM 输出里抠 JSON
//! - `validator` - 逐条结构校验
//! - `converter` - Canvas New Quizzes 格式转换（纯函数、确定性）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个批次"的完整生成流程
//! - `BatchCtx` - 上下文封装（quiz_id + 批次键 + 模块信息）
//! - `BatchFlow` - 流程编排（prompt → LLM → 解析 → 校验 → 计数）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/reservation` - 阶段预约（单飞抢占）
//! - `orchestrator/extraction` - 内容提取阶段
//! - `orchestrator/generation` - 批次调度、断点续跑、终态落定
//! - `orchestrator/export` - 全有或全无的 Canvas 导出
//! - `orchestrator/pipeline` - 多 Quiz 并发入口
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod store;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::question::{Question, QuestionPayload};
pub use models::quiz::{BatchKey, Quiz};
pub use models::status::QuizStatus;
pub use orchestrator::{ExportOutcome, QuizPipeline};
pub use store::{InMemoryQuizStore, QuizStore};
pub use workflow::{BatchCtx, BatchFlow, BatchOutcome};
