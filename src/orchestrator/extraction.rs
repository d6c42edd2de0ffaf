//! 内容提取阶段 - 编排层
//!
//! canvas 模块走 Canvas API 提取；manual 模块把教师粘贴的内容
//! 在本地按段落切块。两类内容最终都落到 `extracted_content`。
//! 提取成功后 Quiz 留在 `extracting_content`，等生成阶段来抢占。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::{with_backoff, ContentExtractor};
use crate::config::Config;
use crate::error::AppResult;
use crate::models::quiz::{ContentChunk, ModuleSource, Quiz};
use crate::models::status::{FailureReason, QuizStatus};
use crate::orchestrator::reservation::{ReservationGuard, Stage};
use crate::store::{QuizStore, TransitionOutcome};

/// 提取阶段的结果
#[derive(Debug, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// 没抢到 Quiz，别人在处理
    Skipped,
    /// 内容已持久化，Quiz 留在 extracting_content
    Extracted,
    /// 已迁移到 failed（原因写在 Quiz 上）
    Failed(FailureReason),
}

/// 内容提取阶段
pub struct ExtractionStage {
    store: Arc<dyn QuizStore>,
    extractor: Arc<dyn ContentExtractor>,
    guard: ReservationGuard,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl ExtractionStage {
    pub fn new(
        store: Arc<dyn QuizStore>,
        extractor: Arc<dyn ContentExtractor>,
        config: &Config,
    ) -> Self {
        Self {
            guard: ReservationGuard::new(store.clone()),
            store,
            extractor,
            max_retries: config.max_generation_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    pub async fn run(&self, quiz_id: Uuid, token: &str) -> AppResult<ExtractionOutcome> {
        let quiz = match self.guard.reserve(quiz_id, Stage::Extraction).await? {
            Some(quiz) => quiz,
            None => return Ok(ExtractionOutcome::Skipped),
        };

        info!(
            "[Quiz {}] 开始提取内容: {} 个模块",
            quiz_id,
            quiz.selected_modules.len()
        );

        let content = match self.collect_content(&quiz, token).await {
            Ok(content) => content,
            Err(e) => {
                error!("[Quiz {}] 提取失败: {}", quiz_id, e);
                return self
                    .fail(quiz_id, FailureReason::ContentExtractionError)
                    .await;
            }
        };

        let total_chunks: usize = content.values().map(Vec::len).sum();
        if total_chunks == 0 {
            error!("[Quiz {}] 所有模块都没有提取到内容", quiz_id);
            return self.fail(quiz_id, FailureReason::NoContentFound).await;
        }

        // 自环迁移：状态不变，事务内写入提取结果
        let written = self
            .store
            .try_transition(
                quiz_id,
                QuizStatus::ExtractingContent,
                Some(Box::new(move |q| {
                    q.extracted_content = content;
                })),
            )
            .await?;
        if let TransitionOutcome::Rejected { from, to } = written {
            warn!(
                "[Quiz {}] 提取结果写入被拒绝: {} → {}，状态已被并发修改，不覆盖",
                quiz_id, from, to
            );
        }

        info!("[Quiz {}] ✓ 提取完成: {} 段内容", quiz_id, total_chunks);
        Ok(ExtractionOutcome::Extracted)
    }

    /// 汇总全部模块的内容
    async fn collect_content(
        &self,
        quiz: &Quiz,
        token: &str,
    ) -> AppResult<HashMap<String, Vec<ContentChunk>>> {
        let mut content: HashMap<String, Vec<ContentChunk>> = HashMap::new();

        let canvas_module_ids: Vec<String> = quiz
            .selected_modules
            .iter()
            .filter(|(_, m)| m.source_type == ModuleSource::Canvas)
            .map(|(id, _)| id.clone())
            .collect();

        if !canvas_module_ids.is_empty() {
            let extracted = with_backoff("canvas", self.max_retries, self.retry_base_delay, || {
                self.extractor
                    .extract(token, quiz.canvas_course_id, &canvas_module_ids)
            })
            .await?;
            content.extend(extracted);
        }

        for (module_id, module) in &quiz.selected_modules {
            if module.source_type == ModuleSource::Manual {
                if let Some(text) = &module.content {
                    content.insert(module_id.clone(), chunk_manual_content(text));
                }
            }
        }

        Ok(content)
    }

    async fn fail(&self, quiz_id: Uuid, reason: FailureReason) -> AppResult<ExtractionOutcome> {
        self.store
            .try_transition(
                quiz_id,
                QuizStatus::Failed,
                Some(Box::new(move |q| {
                    q.failure_reason = Some(reason);
                })),
            )
            .await?;
        Ok(ExtractionOutcome::Failed(reason))
    }
}

/// 手动内容按空行切段
fn chunk_manual_content(text: &str) -> Vec<ContentChunk> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ContentChunk::new)
        .collect()
}
