//! 业务能力层
//!
//! 无状态的单一职责服务：prompt 模板、LLM 输出解析、
//! 结构校验、Canvas 格式转换。流程编排不在这一层。

pub mod converter;
pub mod parser;
pub mod prompt_service;
pub mod validator;

pub use converter::convert;
pub use prompt_service::{PromptParams, PromptService};
