//! 单批次生成流程 - 工作流层
//!
//! 一个批次从 prompt 到一组题目的完整路径：
//! 1. 构建 prompt，带退避调用 LLM（传输层重试，见 clients::with_backoff）
//! 2. 解析输出里的 JSON；解析失败进入纠错子循环（独立计数器，
//!    把上一轮输出和解码错误发回给模型重写）
//! 3. 逐条校验，丢弃不合法条目
//! 4. 数量判定：多了截断，少了整个批次算失败
//!
//! 批次失败从不向外抛错：结果用 `BatchOutcome` 表达，
//! 由编排层决定怎么记录。

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::clients::{with_backoff, LlmOverrides, LlmProvider};
use crate::config::Config;
use crate::error::AppError;
use crate::models::question::Question;
use crate::models::quiz::ContentChunk;
use crate::services::prompt_service::{PromptParams, PromptService};
use crate::services::{parser, validator};
use crate::workflow::batch_ctx::BatchCtx;

/// 批次失败的种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchFailure {
    /// 纠错次数用完仍然解析不出 JSON
    Parse(String),
    /// 严重外部错误（认证/配额/模型不存在等），立即放弃
    Critical(String),
    /// 可重试错误在退避重试用完后仍然失败
    RetryExhausted(String),
    /// 有效题目数量不足（精确数量要求）
    Shortfall { expected: u32, actual: usize },
}

/// 一个批次的最终结果
#[derive(Debug)]
pub enum BatchOutcome {
    Success {
        questions: Vec<Question>,
        /// 用掉的纠错次数（0 表示一次解析成功）
        correction_attempts: u32,
    },
    Failed {
        failure: BatchFailure,
        correction_attempts: u32,
    },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success { .. })
    }
}

/// 单批次生成流程
pub struct BatchFlow {
    llm: Arc<dyn LlmProvider>,
    prompts: PromptService,
    overrides: LlmOverrides,
    max_generation_retries: u32,
    max_corrections: u32,
    retry_base_delay: Duration,
}

impl BatchFlow {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &Config) -> Self {
        Self {
            llm,
            prompts: PromptService::new(),
            overrides: LlmOverrides::default(),
            max_generation_retries: config.max_generation_retries,
            max_corrections: config.max_corrections,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// 应用 Quiz 级的模型参数覆盖（Quiz 定义里的 llm_model / llm_temperature）
    pub fn with_overrides(mut self, overrides: LlmOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// 跑完一个批次
    pub async fn run(&self, ctx: &BatchCtx, chunks: &[ContentChunk]) -> BatchOutcome {
        let params = PromptParams {
            module_name: &ctx.module_name,
            question_type: ctx.key.question_type,
            difficulty: ctx.key.difficulty,
            count: ctx.key.count,
            language: ctx.language,
        };

        info!(
            "{} 开始生成: {} 道 {} 题",
            ctx, ctx.key.count, ctx.key.question_type
        );

        // 第一轮：正常生成
        let messages = self.prompts.build_generation_messages(&params, chunks);
        let mut raw = match self.call_llm(&messages).await {
            Ok(text) => text,
            Err(e) => return Self::failed_from_error(ctx, e, 0),
        };

        // 解析 + 纠错子循环
        let mut correction_attempts = 0u32;
        let items = loop {
            match parser::extract_question_array(&raw) {
                Ok(items) => break items,
                Err(parse_err) => {
                    if correction_attempts >= self.max_corrections {
                        warn!("{} 纠错次数用完，放弃: {}", ctx, parse_err);
                        return BatchOutcome::Failed {
                            failure: BatchFailure::Parse(parse_err.to_string()),
                            correction_attempts,
                        };
                    }
                    correction_attempts += 1;
                    warn!(
                        "{} 解析失败（纠错 {}/{}）: {}",
                        ctx, correction_attempts, self.max_corrections, parse_err
                    );
                    let correction = self.prompts.build_correction_messages(
                        &params,
                        &raw,
                        &parse_err.to_string(),
                    );
                    raw = match self.call_llm(&correction).await {
                        Ok(text) => text,
                        Err(e) => return Self::failed_from_error(ctx, e, correction_attempts),
                    };
                }
            }
        };

        // 逐条校验，不合法的丢弃
        let mut questions = Vec::with_capacity(items.len());
        for item in &items {
            match validator::validate_item(ctx.key.question_type, item) {
                Ok(payload) => questions.push(Question::new(
                    ctx.quiz_id,
                    ctx.key.module_id.clone(),
                    ctx.key.difficulty,
                    payload,
                )),
                Err(e) => warn!("{} 丢弃不合法条目: {}", ctx, e),
            }
        }

        // 精确数量判定：多则截断，少则失败
        let expected = ctx.key.count as usize;
        if questions.len() < expected {
            warn!(
                "{} 有效题目不足: 需要 {}，有效 {}",
                ctx,
                expected,
                questions.len()
            );
            return BatchOutcome::Failed {
                failure: BatchFailure::Shortfall {
                    expected: ctx.key.count,
                    actual: questions.len(),
                },
                correction_attempts,
            };
        }
        if questions.len() > expected {
            info!(
                "{} 多生成了 {} 道，截断到 {}",
                ctx,
                questions.len() - expected,
                expected
            );
            questions.truncate(expected);
        }

        info!(
            "{} ✓ 生成完成: {} 道题（纠错 {} 次）",
            ctx,
            questions.len(),
            correction_attempts
        );
        BatchOutcome::Success {
            questions,
            correction_attempts,
        }
    }

    async fn call_llm(&self, messages: &[crate::clients::ChatMessage]) -> Result<String, AppError> {
        with_backoff(
            "llm",
            self.max_generation_retries,
            self.retry_base_delay,
            || self.llm.generate_with(messages, &self.overrides),
        )
        .await
    }

    fn failed_from_error(ctx: &BatchCtx, error: AppError, correction_attempts: u32) -> BatchOutcome {
        let failure = if error.is_retryable() {
            warn!("{} 重试用完仍然失败: {}", ctx, error);
            BatchFailure::RetryExhausted(error.to_string())
        } else {
            warn!("{} 严重错误，立即放弃: {}", ctx, error);
            BatchFailure::Critical(error.to_string())
        };
        BatchOutcome::Failed {
            failure,
            correction_attempts,
        }
    }
}
