//! 导出阶段 - 编排层
//!
//! Quiz 级别全有或全无：建壳 → 逐题转换 → 提交条目；
//! 任何一题失败就尽力删掉壳（删除失败只记日志），
//! Quiz 迁移到 failed，`canvas_quiz_id` 保持未设置。
//! 已导出过的 Quiz 直接短路返回，不发任何外部请求。

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::{ItemExporter, QuizCreator, QuizDeleter};
use crate::error::AppResult;
use crate::models::status::{FailureReason, QuizStatus};
use crate::orchestrator::reservation::{ReservationGuard, Stage};
use crate::services::converter;
use crate::store::{QuizStore, TransitionOutcome};

/// 导出阶段的结果
#[derive(Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// canvas_quiz_id 已存在，未发出任何外部请求
    AlreadyExported,
    /// 没抢到 Quiz（含 ready_for_review_partial 等不可导出状态）
    Skipped,
    /// 全部条目成功，Quiz 已发布
    Published,
    /// 已迁移到 failed
    Failed(FailureReason),
}

/// 导出阶段
pub struct ExportStage {
    store: Arc<dyn QuizStore>,
    creator: Arc<dyn QuizCreator>,
    exporter: Arc<dyn ItemExporter>,
    deleter: Arc<dyn QuizDeleter>,
    guard: ReservationGuard,
}

impl ExportStage {
    pub fn new(
        store: Arc<dyn QuizStore>,
        creator: Arc<dyn QuizCreator>,
        exporter: Arc<dyn ItemExporter>,
        deleter: Arc<dyn QuizDeleter>,
    ) -> Self {
        Self {
            guard: ReservationGuard::new(store.clone()),
            store,
            creator,
            exporter,
            deleter,
        }
    }

    pub async fn run(&self, quiz_id: Uuid, token: &str) -> AppResult<ExportOutcome> {
        // 幂等短路：导出过就不再碰外部系统
        let quiz = self.store.get_quiz(quiz_id).await?;
        if quiz.canvas_quiz_id.is_some() {
            info!("[Quiz {}] 已导出过，跳过", quiz_id);
            return Ok(ExportOutcome::AlreadyExported);
        }

        let quiz = match self.guard.reserve(quiz_id, Stage::Export).await? {
            Some(quiz) => quiz,
            None => return Ok(ExportOutcome::Skipped),
        };

        // 只导出已审核的题目
        let approved = self.store.approved_questions(quiz_id).await?;
        if approved.is_empty() {
            error!("[Quiz {}] 没有已审核的题目，无法导出", quiz_id);
            return self
                .fail(quiz_id, FailureReason::NoApprovedQuestions)
                .await;
        }

        info!(
            "[Quiz {}] 开始导出: {} 道已审核题目",
            quiz_id,
            approved.len()
        );

        // 建壳；外部 id 只留在本地变量里，失败时绝不写入 Quiz
        let canvas_quiz_id = match self
            .creator
            .create_quiz(token, quiz.canvas_course_id, &quiz.title, approved.len() as u32)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!("[Quiz {}] 建壳失败: {}", quiz_id, e);
                return self.fail(quiz_id, FailureReason::CanvasExportError).await;
            }
        };

        // 逐题转换；转换失败也要回滚壳
        let mut items = Vec::with_capacity(approved.len());
        for (index, question) in approved.iter().enumerate() {
            match converter::convert(question, index as u32 + 1) {
                Ok(item) => items.push(item),
                Err(e) => {
                    error!(
                        "[Quiz {}] 题目 {} 转换失败: {}",
                        quiz_id, question.id, e
                    );
                    self.rollback(quiz_id, token, quiz.canvas_course_id, &canvas_quiz_id)
                        .await;
                    return self.fail(quiz_id, FailureReason::CanvasExportError).await;
                }
            }
        }

        // 提交条目
        let results = match self
            .exporter
            .export_items(token, quiz.canvas_course_id, &canvas_quiz_id, &items)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                error!("[Quiz {}] 条目提交失败: {}", quiz_id, e);
                self.rollback(quiz_id, token, quiz.canvas_course_id, &canvas_quiz_id)
                    .await;
                return self.fail(quiz_id, FailureReason::CanvasExportError).await;
            }
        };

        let failed_count = results.iter().filter(|r| !r.success).count();
        if failed_count > 0 {
            error!(
                "[Quiz {}] {}/{} 道题导出失败，回滚",
                quiz_id,
                failed_count,
                results.len()
            );
            self.rollback(quiz_id, token, quiz.canvas_course_id, &canvas_quiz_id)
                .await;
            return self.fail(quiz_id, FailureReason::CanvasExportError).await;
        }

        // 全部成功：写入外部 id，迁移到 published
        let external_id = canvas_quiz_id.clone();
        let written = self
            .store
            .try_transition(
                quiz_id,
                QuizStatus::Published,
                Some(Box::new(move |q| {
                    q.canvas_quiz_id = Some(external_id);
                    q.exported_at = Some(Utc::now());
                    q.failure_reason = None;
                })),
            )
            .await?;
        if let TransitionOutcome::Rejected { from, to } = written {
            warn!(
                "[Quiz {}] 发布写入被拒绝: {} → {}，状态已被并发修改，不覆盖",
                quiz_id, from, to
            );
        } else {
            info!(
                "[Quiz {}] ✓ 已发布到 Canvas (quiz {})",
                quiz_id, canvas_quiz_id
            );
        }
        Ok(ExportOutcome::Published)
    }

    /// 尽力删除已建的壳；删除失败只记日志，不再重试
    async fn rollback(&self, quiz_id: Uuid, token: &str, course_id: u64, canvas_quiz_id: &str) {
        match self.deleter.delete_quiz(token, course_id, canvas_quiz_id).await {
            Ok(true) => info!("[Quiz {}] 回滚完成，壳已删除", quiz_id),
            Ok(false) => warn!("[Quiz {}] 回滚删除未生效: quiz {}", quiz_id, canvas_quiz_id),
            Err(e) => warn!("[Quiz {}] 回滚删除失败: {}", quiz_id, e),
        }
    }

    async fn fail(&self, quiz_id: Uuid, reason: FailureReason) -> AppResult<ExportOutcome> {
        self.store
            .try_transition(
                quiz_id,
                QuizStatus::Failed,
                Some(Box::new(move |q| {
                    q.failure_reason = Some(reason);
                })),
            )
            .await?;
        Ok(ExportOutcome::Failed(reason))
    }
}
