//! 阶段预约 - 编排层
//!
//! 每个阶段（提取/生成/导出）开工前必须先抢到 Quiz：
//! 一次条件更新完成"读状态 → 校验入口迁移 → 写入"，
//! N 个并发预约至多一个成功。抢不到不是错误，调用方静默跳过。

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::quiz::Quiz;
use crate::models::status::QuizStatus;
use crate::store::{QuizStore, TransitionOutcome};

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Generation,
    Export,
}

impl Stage {
    /// 阶段的入口状态（预约成功后 Quiz 处于这个状态）
    pub fn entry_state(&self) -> QuizStatus {
        match self {
            Stage::Extraction => QuizStatus::ExtractingContent,
            Stage::Generation => QuizStatus::GeneratingQuestions,
            Stage::Export => QuizStatus::ExportingToCanvas,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "提取",
            Stage::Generation => "生成",
            Stage::Export => "导出",
        }
    }
}

/// 阶段预约守卫
pub struct ReservationGuard {
    store: Arc<dyn QuizStore>,
}

impl ReservationGuard {
    pub fn new(store: Arc<dyn QuizStore>) -> Self {
        Self { store }
    }

    /// 尝试为某阶段抢占 Quiz
    ///
    /// 成功返回迁移后的 Quiz 快照（阶段的全部工作参数都在里面）；
    /// 入口迁移不合法或已被别人抢走返回 `None`。
    pub async fn reserve(&self, quiz_id: Uuid, stage: Stage) -> AppResult<Option<Quiz>> {
        match self.store.try_claim(quiz_id, stage.entry_state()).await? {
            TransitionOutcome::Applied(quiz) => Ok(Some(quiz)),
            TransitionOutcome::Rejected { from, to } => {
                info!(
                    "[Quiz {}] {} 阶段预约失败（{} → {} 不可用），跳过",
                    quiz_id,
                    stage.as_str(),
                    from,
                    to
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::QuizLanguage;
    use crate::store::InMemoryQuizStore;
    use std::collections::HashMap;

    fn sample_quiz() -> Quiz {
        Quiz::new("测试", 1, HashMap::new(), QuizLanguage::English)
    }

    #[tokio::test]
    async fn test_reserve_moves_to_entry_state() {
        let store = Arc::new(InMemoryQuizStore::new());
        let quiz = sample_quiz();
        let quiz_id = quiz.id;
        store.insert_quiz(quiz).await.unwrap();

        let guard = ReservationGuard::new(store.clone());
        let reserved = guard.reserve(quiz_id, Stage::Extraction).await.unwrap();

        let reserved = reserved.expect("created → extracting_content 应当成功");
        assert_eq!(reserved.status, QuizStatus::ExtractingContent);
    }

    #[tokio::test]
    async fn test_second_reservation_is_rejected() {
        let store = Arc::new(InMemoryQuizStore::new());
        let quiz = sample_quiz();
        let quiz_id = quiz.id;
        store.insert_quiz(quiz).await.unwrap();

        let guard = ReservationGuard::new(store.clone());
        assert!(guard
            .reserve(quiz_id, Stage::Extraction)
            .await
            .unwrap()
            .is_some());
        // 同一阶段再抢一次：自环被抢占拒绝
        assert!(guard
            .reserve(quiz_id, Stage::Extraction)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_reserve_from_wrong_state_returns_none() {
        let store = Arc::new(InMemoryQuizStore::new());
        let quiz = sample_quiz();
        let quiz_id = quiz.id;
        store.insert_quiz(quiz).await.unwrap();

        let guard = ReservationGuard::new(store);
        // created → exporting_to_canvas 不合法
        assert!(guard
            .reserve(quiz_id, Stage::Export)
            .await
            .unwrap()
            .is_none());
    }
}
