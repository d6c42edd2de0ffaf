//! 流水线入口 - 编排层
//!
//! `QuizPipeline` 把三个阶段拼起来：run = 提取 + 生成，
//! export 是独立入口（中间隔着人工审核）。
//! `run_all` 用 Semaphore 限制同时处理的 Quiz 数量。

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};
use uuid::Uuid;

use crate::clients::{ContentExtractor, ItemExporter, LlmProvider, QuizCreator, QuizDeleter};
use crate::config::Config;
use crate::error::AppResult;
use crate::models::status::QuizStatus;
use crate::orchestrator::export::{ExportOutcome, ExportStage};
use crate::orchestrator::extraction::{ExtractionOutcome, ExtractionStage};
use crate::orchestrator::generation::{GenerationOutcome, GenerationStage};
use crate::store::QuizStore;

/// Quiz 流水线
pub struct QuizPipeline {
    store: Arc<dyn QuizStore>,
    extraction: ExtractionStage,
    generation: GenerationStage,
    export: ExportStage,
    config: Config,
}

impl QuizPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn QuizStore>,
        llm: Arc<dyn LlmProvider>,
        extractor: Arc<dyn ContentExtractor>,
        creator: Arc<dyn QuizCreator>,
        exporter: Arc<dyn ItemExporter>,
        deleter: Arc<dyn QuizDeleter>,
        config: Config,
    ) -> Self {
        Self {
            extraction: ExtractionStage::new(store.clone(), extractor, &config),
            generation: GenerationStage::new(store.clone(), llm, config.clone()),
            export: ExportStage::new(store.clone(), creator, exporter, deleter),
            store,
            config,
        }
    }

    /// 提取 + 生成（审核之前的全部流程）
    ///
    /// 返回跑完之后 Quiz 的状态。
    pub async fn run(&self, quiz_id: Uuid, token: &str) -> AppResult<QuizStatus> {
        log_quiz_start(quiz_id);

        match self.extraction.run(quiz_id, token).await? {
            ExtractionOutcome::Extracted => {}
            ExtractionOutcome::Skipped => {
                info!("[Quiz {}] 提取阶段被跳过，不继续生成", quiz_id);
                return Ok(self.store.get_quiz(quiz_id).await?.status);
            }
            ExtractionOutcome::Failed(reason) => {
                error!("[Quiz {}] 提取失败: {:?}", quiz_id, reason);
                return Ok(QuizStatus::Failed);
            }
        }

        match self.generation.run(quiz_id).await? {
            GenerationOutcome::Completed { final_status, .. } => {
                log_quiz_done(quiz_id, final_status);
                Ok(final_status)
            }
            GenerationOutcome::Skipped => Ok(self.store.get_quiz(quiz_id).await?.status),
        }
    }

    /// 审核后的导出入口
    pub async fn export(&self, quiz_id: Uuid, token: &str) -> AppResult<ExportOutcome> {
        self.export.run(quiz_id, token).await
    }

    /// 并发处理一组 Quiz，返回 (成功数, 失败数)
    pub async fn run_all(self: &Arc<Self>, quiz_ids: Vec<Uuid>, token: &str) -> (usize, usize) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_quizzes));
        let mut handles = Vec::with_capacity(quiz_ids.len());

        for quiz_id in quiz_ids {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let pipeline = self.clone();
            let token = token.to_string();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                pipeline.run(quiz_id, &token).await
            }));
        }

        let mut success = 0usize;
        let mut failed = 0usize;
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(Ok(status)) if status != QuizStatus::Failed => success += 1,
                Ok(Ok(_)) => failed += 1,
                Ok(Err(e)) => {
                    error!("Quiz 处理出错: {}", e);
                    failed += 1;
                }
                Err(e) => {
                    error!("Quiz 任务崩溃: {}", e);
                    failed += 1;
                }
            }
        }
        (success, failed)
    }
}

impl std::fmt::Debug for QuizPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuizPipeline").finish_non_exhaustive()
    }
}

fn log_quiz_start(quiz_id: Uuid) {
    info!("{}", "-".repeat(60));
    info!("▶ [Quiz {}] 开始处理", quiz_id);
}

fn log_quiz_done(quiz_id: Uuid, status: QuizStatus) {
    info!("■ [Quiz {}] 处理结束: {}", quiz_id, status);
}
