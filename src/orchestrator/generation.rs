//! 生成阶段 - 编排层
//!
//! 抢占 Quiz → 算出待跑批次（跳过已成功的，可断点续跑）→
//! Semaphore 限流并发跑批 → 合并结果、写题目、一次迁移落定终态。
//! 单个批次失败不影响兄弟批次。

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::{LlmOverrides, LlmProvider};
use crate::config::Config;
use crate::error::AppResult;
use crate::models::question::Question;
use crate::models::status::QuizStatus;
use crate::orchestrator::batch_tracker;
use crate::orchestrator::reservation::{ReservationGuard, Stage};
use crate::store::{QuizStore, TransitionOutcome};
use crate::workflow::{BatchCtx, BatchFlow, BatchOutcome};

/// 生成阶段的结果
#[derive(Debug)]
pub enum GenerationOutcome {
    /// 没抢到 Quiz
    Skipped,
    /// 所有批次已跑完，Quiz 落在 final_status
    Completed {
        final_status: QuizStatus,
        succeeded: usize,
        failed: usize,
    },
}

/// 生成阶段
pub struct GenerationStage {
    store: Arc<dyn QuizStore>,
    llm: Arc<dyn LlmProvider>,
    guard: ReservationGuard,
    config: Config,
}

impl GenerationStage {
    pub fn new(store: Arc<dyn QuizStore>, llm: Arc<dyn LlmProvider>, config: Config) -> Self {
        Self {
            guard: ReservationGuard::new(store.clone()),
            store,
            llm,
            config,
        }
    }

    pub async fn run(&self, quiz_id: Uuid) -> AppResult<GenerationOutcome> {
        let quiz = match self.guard.reserve(quiz_id, Stage::Generation).await? {
            Some(quiz) => quiz,
            None => return Ok(GenerationOutcome::Skipped),
        };

        // 断点续跑：已成功的批次直接跳过
        let pending: Vec<_> = quiz
            .declared_batch_keys()
            .into_iter()
            .filter(|key| {
                !quiz
                    .generation_metadata
                    .successful_batches
                    .contains(&key.storage_key())
            })
            .collect();

        info!(
            "[Quiz {}] 开始生成: {} 个批次待跑（{} 个已成功，跳过）",
            quiz_id,
            pending.len(),
            quiz.generation_metadata.successful_batches.len()
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_batches));
        // Quiz 定义可以覆盖默认模型和温度
        let overrides = LlmOverrides {
            model: quiz.llm_model.clone(),
            temperature: Some(quiz.llm_temperature),
        };
        let flow = Arc::new(BatchFlow::new(self.llm.clone(), &self.config).with_overrides(overrides));

        let mut handles = Vec::with_capacity(pending.len());
        for key in pending {
            let permit = semaphore.clone().acquire_owned().await?;
            let module_name = quiz
                .selected_modules
                .get(&key.module_id)
                .map(|m| m.name.clone())
                .unwrap_or_else(|| key.module_id.clone());
            let chunks = quiz.module_content(&key.module_id);
            let ctx = BatchCtx::new(quiz_id, key.clone(), module_name, quiz.language);
            let flow = flow.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                flow.run(&ctx, &chunks).await
            });
            handles.push((key.storage_key(), handle));
        }

        let mut successes = BTreeSet::new();
        let mut failures = BTreeSet::new();
        let mut questions: Vec<Question> = Vec::new();
        for (storage_key, handle) in handles {
            match handle.await {
                Ok(BatchOutcome::Success {
                    questions: batch_questions,
                    ..
                }) => {
                    questions.extend(batch_questions);
                    successes.insert(storage_key);
                }
                Ok(BatchOutcome::Failed { failure, .. }) => {
                    warn!("[Quiz {}] 批次 {} 失败: {:?}", quiz_id, storage_key, failure);
                    failures.insert(storage_key);
                }
                Err(e) => {
                    error!("[Quiz {}] 批次 {} 任务崩溃: {}", quiz_id, storage_key, e);
                    failures.insert(storage_key);
                }
            }
        }

        let merged = batch_tracker::merge(&quiz.generation_metadata, &successes, &failures);
        let (final_status, failure_reason) = batch_tracker::final_status(&quiz, &merged);

        self.store.insert_questions(questions).await?;
        let metadata = merged.clone();
        let written = self
            .store
            .try_transition(
                quiz_id,
                final_status,
                Some(Box::new(move |q| {
                    q.generation_metadata = metadata;
                    q.failure_reason = failure_reason;
                })),
            )
            .await?;
        if let TransitionOutcome::Rejected { from, to } = written {
            warn!(
                "[Quiz {}] 终态写入被拒绝: {} → {}，状态已被并发修改，不覆盖",
                quiz_id, from, to
            );
        }

        info!(
            "[Quiz {}] ✓ 生成阶段结束: {} 成功 / {} 失败 → {}",
            quiz_id,
            successes.len(),
            failures.len(),
            final_status
        );
        Ok(GenerationOutcome::Completed {
            final_status,
            succeeded: successes.len(),
            failed: failures.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ChatMessage;
    use crate::models::question::{Difficulty, QuestionType};
    use crate::models::quiz::{
        ModuleSelection, ModuleSource, QuestionBatch, Quiz, QuizLanguage,
    };
    use crate::store::InMemoryQuizStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// 按题型回答固定数量判断题的 mock
    struct CountingLlm;

    #[async_trait]
    impl LlmProvider for CountingLlm {
        async fn generate(&self, messages: &[ChatMessage]) -> AppResult<String> {
            // 从 prompt 里读出要求的数量
            let prompt = &messages[1].content;
            let count = prompt
                .split("exactly ")
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(1);
            let items: Vec<String> = (0..count)
                .map(|i| format!(r#"{{"question_text": "陈述 {}", "correct_answer": true}}"#, i))
                .collect();
            Ok(format!("[{}]", items.join(",")))
        }
    }

    fn quiz_with_batches(batches: Vec<QuestionBatch>) -> Quiz {
        let mut modules = HashMap::new();
        modules.insert(
            "m1".to_string(),
            ModuleSelection {
                name: "Week 1".to_string(),
                source_type: ModuleSource::Manual,
                content: Some("课程材料".to_string()),
                question_batches: batches,
            },
        );
        let mut quiz = Quiz::new("测试", 1, modules, QuizLanguage::English);
        quiz.status = QuizStatus::ExtractingContent;
        quiz
    }

    fn test_config() -> Config {
        Config {
            max_concurrent_batches: 2,
            max_generation_retries: 1,
            max_corrections: 1,
            retry_base_delay_ms: 1,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_all_batches_succeed() {
        let store = Arc::new(InMemoryQuizStore::new());
        let quiz = quiz_with_batches(vec![
            QuestionBatch {
                question_type: QuestionType::TrueFalse,
                difficulty: Difficulty::Easy,
                count: 2,
            },
            QuestionBatch {
                question_type: QuestionType::TrueFalse,
                difficulty: Difficulty::Hard,
                count: 3,
            },
        ]);
        let quiz_id = quiz.id;
        store.insert_quiz(quiz).await.unwrap();

        let stage = GenerationStage::new(store.clone(), Arc::new(CountingLlm), test_config());
        let outcome = stage.run(quiz_id).await.unwrap();

        match outcome {
            GenerationOutcome::Completed {
                final_status,
                succeeded,
                failed,
            } => {
                assert_eq!(final_status, QuizStatus::ReadyForReview);
                assert_eq!(succeeded, 2);
                assert_eq!(failed, 0);
            }
            other => panic!("应当完成: {:?}", other),
        }

        let questions = store.questions_for_quiz(quiz_id).await.unwrap();
        assert_eq!(questions.len(), 5);
        let quiz = store.get_quiz(quiz_id).await.unwrap();
        assert_eq!(quiz.generation_metadata.successful_batches.len(), 2);
    }

    #[tokio::test]
    async fn test_resumability_skips_successful_batches() {
        let store = Arc::new(InMemoryQuizStore::new());
        let mut quiz = quiz_with_batches(vec![
            QuestionBatch {
                question_type: QuestionType::TrueFalse,
                difficulty: Difficulty::Easy,
                count: 2,
            },
            QuestionBatch {
                question_type: QuestionType::TrueFalse,
                difficulty: Difficulty::Hard,
                count: 3,
            },
        ]);
        // 第一个批次已经成功过
        quiz.generation_metadata
            .successful_batches
            .insert("m1_true_false_easy_2".to_string());
        quiz.status = QuizStatus::Failed;
        let quiz_id = quiz.id;
        store.insert_quiz(quiz).await.unwrap();

        let stage = GenerationStage::new(store.clone(), Arc::new(CountingLlm), test_config());
        let outcome = stage.run(quiz_id).await.unwrap();

        match outcome {
            GenerationOutcome::Completed {
                final_status,
                succeeded,
                ..
            } => {
                assert_eq!(final_status, QuizStatus::ReadyForReview);
                // 只跑了剩下的那个批次
                assert_eq!(succeeded, 1);
            }
            other => panic!("应当完成: {:?}", other),
        }

        // 跳过的批次没有产生新题目
        let questions = store.questions_for_quiz(quiz_id).await.unwrap();
        assert_eq!(questions.len(), 3);
    }

    /// 指定题型失败、其余正常的 mock
    struct SelectiveLlm {
        failing_type: &'static str,
    }

    #[async_trait]
    impl LlmProvider for SelectiveLlm {
        async fn generate(&self, messages: &[ChatMessage]) -> AppResult<String> {
            let prompt = &messages[1].content;
            if prompt.contains(self.failing_type) {
                return Err(crate::error::AppError::critical(
                    crate::error::CriticalKind::QuotaExceeded,
                    "llm",
                    "配额用尽",
                ));
            }
            CountingLlm.generate(messages).await
        }
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_affect_sibling() {
        let store = Arc::new(InMemoryQuizStore::new());
        let quiz = quiz_with_batches(vec![
            QuestionBatch {
                question_type: QuestionType::TrueFalse,
                difficulty: Difficulty::Easy,
                count: 2,
            },
            QuestionBatch {
                question_type: QuestionType::MultipleChoice,
                difficulty: Difficulty::Medium,
                count: 2,
            },
        ]);
        let quiz_id = quiz.id;
        store.insert_quiz(quiz).await.unwrap();

        // 选择题批次失败，判断题批次不受影响
        let llm = Arc::new(SelectiveLlm {
            failing_type: "multiple-choice",
        });
        let stage = GenerationStage::new(store.clone(), llm, test_config());
        let outcome = stage.run(quiz_id).await.unwrap();

        match outcome {
            GenerationOutcome::Completed {
                final_status,
                succeeded,
                failed,
            } => {
                assert_eq!(final_status, QuizStatus::ReadyForReviewPartial);
                assert_eq!(succeeded, 1);
                assert_eq!(failed, 1);
            }
            other => panic!("应当完成: {:?}", other),
        }

        let quiz = store.get_quiz(quiz_id).await.unwrap();
        assert!(quiz
            .generation_metadata
            .successful_batches
            .contains("m1_true_false_easy_2"));
        assert!(quiz
            .generation_metadata
            .failed_batches
            .contains("m1_multiple_choice_medium_2"));
        // 成功批次的题目照常入库
        let questions = store.questions_for_quiz(quiz_id).await.unwrap();
        assert_eq!(questions.len(), 2);
    }

    /// 记录收到的模型覆盖、其余行为同 CountingLlm 的 mock
    struct ModelRecordingLlm {
        seen_model: std::sync::Mutex<Option<String>>,
    }

    #[async_trait]
    impl LlmProvider for ModelRecordingLlm {
        async fn generate(&self, messages: &[ChatMessage]) -> AppResult<String> {
            CountingLlm.generate(messages).await
        }

        async fn generate_with(
            &self,
            messages: &[ChatMessage],
            overrides: &LlmOverrides,
        ) -> AppResult<String> {
            *self.seen_model.lock().unwrap() = overrides.model.clone();
            self.generate(messages).await
        }
    }

    #[tokio::test]
    async fn test_quiz_model_override_reaches_provider() {
        let store = Arc::new(InMemoryQuizStore::new());
        let mut quiz = quiz_with_batches(vec![QuestionBatch {
            question_type: QuestionType::TrueFalse,
            difficulty: Difficulty::Easy,
            count: 1,
        }]);
        quiz.llm_model = Some("gpt-4o-mini".to_string());
        let quiz_id = quiz.id;
        store.insert_quiz(quiz).await.unwrap();

        let llm = Arc::new(ModelRecordingLlm {
            seen_model: std::sync::Mutex::new(None),
        });
        let stage = GenerationStage::new(store.clone(), llm.clone(), test_config());
        let outcome = stage.run(quiz_id).await.unwrap();

        assert!(matches!(outcome, GenerationOutcome::Completed { .. }));
        assert_eq!(
            *llm.seen_model.lock().unwrap(),
            Some("gpt-4o-mini".to_string())
        );
    }

    /// 生成期间把 Quiz 改成 failed 的 mock（模拟并发写入）
    struct SabotagingLlm {
        store: Arc<InMemoryQuizStore>,
        quiz_id: Uuid,
    }

    #[async_trait]
    impl LlmProvider for SabotagingLlm {
        async fn generate(&self, messages: &[ChatMessage]) -> AppResult<String> {
            let _ = self
                .store
                .try_transition(self.quiz_id, QuizStatus::Failed, None)
                .await;
            CountingLlm.generate(messages).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_failure_not_overwritten() {
        let store = Arc::new(InMemoryQuizStore::new());
        let quiz = quiz_with_batches(vec![QuestionBatch {
            question_type: QuestionType::TrueFalse,
            difficulty: Difficulty::Easy,
            count: 1,
        }]);
        let quiz_id = quiz.id;
        store.insert_quiz(quiz).await.unwrap();

        let llm = Arc::new(SabotagingLlm {
            store: store.clone(),
            quiz_id,
        });
        let stage = GenerationStage::new(store.clone(), llm, test_config());
        let outcome = stage.run(quiz_id).await.unwrap();

        // 阶段本身正常结束，但终态写入被迁移表拒绝
        assert!(matches!(outcome, GenerationOutcome::Completed { .. }));
        let quiz = store.get_quiz(quiz_id).await.unwrap();
        assert_eq!(quiz.status, QuizStatus::Failed);
    }

    #[tokio::test]
    async fn test_skip_when_not_reservable() {
        let store = Arc::new(InMemoryQuizStore::new());
        let mut quiz = quiz_with_batches(vec![]);
        quiz.status = QuizStatus::Published;
        let quiz_id = quiz.id;
        store.insert_quiz(quiz).await.unwrap();

        let stage = GenerationStage::new(store, Arc::new(CountingLlm), test_config());
        let outcome = stage.run(quiz_id).await.unwrap();
        assert!(matches!(outcome, GenerationOutcome::Skipped));
    }
}
