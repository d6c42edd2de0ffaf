//! 批次上下文
//!
//! 把一个批次需要的所有只读信息收拢到一个结构里，
//! 日志前缀统一从这里出。

use std::fmt;
use uuid::Uuid;

use crate::models::quiz::{BatchKey, QuizLanguage};

/// 一个生成批次的只读上下文
#[derive(Debug, Clone)]
pub struct BatchCtx {
    pub quiz_id: Uuid,
    pub key: BatchKey,
    pub module_name: String,
    pub language: QuizLanguage,
}

impl BatchCtx {
    pub fn new(
        quiz_id: Uuid,
        key: BatchKey,
        module_name: impl Into<String>,
        language: QuizLanguage,
    ) -> Self {
        Self {
            quiz_id,
            key,
            module_name: module_name.into(),
            language,
        }
    }
}

impl fmt::Display for BatchCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[批次 {}]", self.key)
    }
}
