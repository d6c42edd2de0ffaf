//! 流水线集成测试
//!
//! 用内存 store 和 mock 协作方跑完整流程，
//! 覆盖抢占单飞、断点续跑、导出回滚等跨层行为。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use quiz_pipeline::clients::{
    ChatMessage, ContentExtractor, ItemExportResult, ItemExporter, LlmProvider, QuizCreator,
    QuizDeleter,
};
use quiz_pipeline::config::Config;
use quiz_pipeline::error::AppResult;
use quiz_pipeline::models::question::{Difficulty, QuestionType};
use quiz_pipeline::models::quiz::{
    ContentChunk, ModuleSelection, ModuleSource, QuestionBatch, QuizLanguage,
};
use quiz_pipeline::models::status::{FailureReason, QuizStatus};
use quiz_pipeline::orchestrator::reservation::{ReservationGuard, Stage};
use quiz_pipeline::orchestrator::ExportOutcome;
use quiz_pipeline::store::QuizStore;
use quiz_pipeline::{InMemoryQuizStore, Quiz, QuizPipeline};

// ========== mock 协作方 ==========

/// 按 prompt 里要求的数量返回判断题
struct CountingLlm {
    calls: AtomicUsize,
}

impl CountingLlm {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmProvider for CountingLlm {
    async fn generate(&self, messages: &[ChatMessage]) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
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

struct FixedExtractor;

#[async_trait]
impl ContentExtractor for FixedExtractor {
    async fn extract(
        &self,
        _token: &str,
        _course_id: u64,
        module_ids: &[String],
    ) -> AppResult<HashMap<String, Vec<ContentChunk>>> {
        Ok(module_ids
            .iter()
            .map(|id| (id.clone(), vec![ContentChunk::new("课程材料")]))
            .collect())
    }
}

/// 记录调用次数的 Canvas mock；item 结果按脚本返回
struct ScriptedCanvas {
    create_calls: AtomicUsize,
    export_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    /// 每次 export_items 按这里的布尔序列决定每道题成败；空表示全成功
    item_script: Mutex<Vec<bool>>,
}

impl ScriptedCanvas {
    fn all_success() -> Self {
        Self::with_script(vec![])
    }

    fn with_script(item_script: Vec<bool>) -> Self {
        Self {
            create_calls: AtomicUsize::new(0),
            export_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            item_script: Mutex::new(item_script),
        }
    }
}

#[async_trait]
impl QuizCreator for ScriptedCanvas {
    async fn create_quiz(
        &self,
        _token: &str,
        _course_id: u64,
        _title: &str,
        _total_points: u32,
    ) -> AppResult<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok("canvas-quiz-42".to_string())
    }
}

#[async_trait]
impl ItemExporter for ScriptedCanvas {
    async fn export_items(
        &self,
        _token: &str,
        _course_id: u64,
        _canvas_quiz_id: &str,
        items: &[serde_json::Value],
    ) -> AppResult<Vec<ItemExportResult>> {
        self.export_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.item_script.lock().unwrap();
        Ok(items
            .iter()
            .enumerate()
            .map(|(i, _)| match script.get(i) {
                Some(false) => ItemExportResult::failed("500 Internal Server Error"),
                _ => ItemExportResult::ok(format!("item-{}", i)),
            })
            .collect())
    }
}

#[async_trait]
impl QuizDeleter for ScriptedCanvas {
    async fn delete_quiz(
        &self,
        _token: &str,
        _course_id: u64,
        _canvas_quiz_id: &str,
    ) -> AppResult<bool> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

// ========== 测试装配 ==========

fn manual_quiz(batches: Vec<QuestionBatch>) -> Quiz {
    let mut modules = HashMap::new();
    modules.insert(
        "m1".to_string(),
        ModuleSelection {
            name: "Week 1".to_string(),
            source_type: ModuleSource::Manual,
            content: Some("光合作用把光能转化为化学能。\n\n呼吸作用反过来。".to_string()),
            question_batches: batches,
        },
    );
    Quiz::new("集成测试", 37823, modules, QuizLanguage::English)
}

fn true_false_batch(count: u32) -> QuestionBatch {
    QuestionBatch {
        question_type: QuestionType::TrueFalse,
        difficulty: Difficulty::Easy,
        count,
    }
}

fn test_config() -> Config {
    Config {
        max_concurrent_batches: 3,
        max_concurrent_quizzes: 2,
        max_generation_retries: 1,
        max_corrections: 1,
        retry_base_delay_ms: 1,
        ..Config::default()
    }
}

fn build_pipeline(
    store: Arc<InMemoryQuizStore>,
    canvas: Arc<ScriptedCanvas>,
) -> Arc<QuizPipeline> {
    Arc::new(QuizPipeline::new(
        store,
        Arc::new(CountingLlm::new()),
        Arc::new(FixedExtractor),
        canvas.clone(),
        canvas.clone(),
        canvas,
        test_config(),
    ))
}

// ========== 场景 ==========

#[tokio::test]
async fn test_concurrent_reservations_only_one_wins() {
    let store: Arc<InMemoryQuizStore> = Arc::new(InMemoryQuizStore::new());
    let quiz = manual_quiz(vec![]);
    let quiz_id = quiz.id;
    store.insert_quiz(quiz).await.unwrap();

    let guard = Arc::new(ReservationGuard::new(store.clone()));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let guard = guard.clone();
        handles.push(tokio::spawn(async move {
            guard.reserve(quiz_id, Stage::Extraction).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "8 个并发预约只能有 1 个成功");
}

#[tokio::test]
async fn test_full_pipeline_to_published() {
    let store: Arc<InMemoryQuizStore> = Arc::new(InMemoryQuizStore::new());
    let quiz = manual_quiz(vec![true_false_batch(3)]);
    let quiz_id = quiz.id;
    store.insert_quiz(quiz).await.unwrap();

    let canvas = Arc::new(ScriptedCanvas::all_success());
    let pipeline = build_pipeline(store.clone(), canvas.clone());

    // 提取 + 生成
    let status = pipeline.run(quiz_id, "token").await.unwrap();
    assert_eq!(status, QuizStatus::ReadyForReview);

    // 人工审核：全部通过
    for question in store.questions_for_quiz(quiz_id).await.unwrap() {
        store.approve_question(question.id).await.unwrap();
    }

    // 导出
    let outcome = pipeline.export(quiz_id, "token").await.unwrap();
    assert_eq!(outcome, ExportOutcome::Published);

    let quiz = store.get_quiz(quiz_id).await.unwrap();
    assert_eq!(quiz.status, QuizStatus::Published);
    assert_eq!(quiz.canvas_quiz_id.as_deref(), Some("canvas-quiz-42"));
    assert!(quiz.exported_at.is_some());
    assert_eq!(canvas.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(canvas.export_calls.load(Ordering::SeqCst), 1);
    assert_eq!(canvas.delete_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_export_partial_failure_rolls_back() {
    let store: Arc<InMemoryQuizStore> = Arc::new(InMemoryQuizStore::new());
    let quiz = manual_quiz(vec![true_false_batch(3)]);
    let quiz_id = quiz.id;
    store.insert_quiz(quiz).await.unwrap();

    // 第二道题失败：[成功, 失败, 成功]
    let canvas = Arc::new(ScriptedCanvas::with_script(vec![true, false, true]));
    let pipeline = build_pipeline(store.clone(), canvas.clone());

    pipeline.run(quiz_id, "token").await.unwrap();
    for question in store.questions_for_quiz(quiz_id).await.unwrap() {
        store.approve_question(question.id).await.unwrap();
    }

    let outcome = pipeline.export(quiz_id, "token").await.unwrap();
    assert_eq!(
        outcome,
        ExportOutcome::Failed(FailureReason::CanvasExportError)
    );

    let quiz = store.get_quiz(quiz_id).await.unwrap();
    assert_eq!(quiz.status, QuizStatus::Failed);
    assert_eq!(quiz.failure_reason, Some(FailureReason::CanvasExportError));
    // 外部 id 不落库，壳被回滚删除
    assert!(quiz.canvas_quiz_id.is_none());
    assert_eq!(canvas.delete_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_export_can_retry_and_publish() {
    let store: Arc<InMemoryQuizStore> = Arc::new(InMemoryQuizStore::new());
    let quiz = manual_quiz(vec![true_false_batch(2)]);
    let quiz_id = quiz.id;
    store.insert_quiz(quiz).await.unwrap();

    let failing = Arc::new(ScriptedCanvas::with_script(vec![false, true]));
    let pipeline = build_pipeline(store.clone(), failing);

    pipeline.run(quiz_id, "token").await.unwrap();
    for question in store.questions_for_quiz(quiz_id).await.unwrap() {
        store.approve_question(question.id).await.unwrap();
    }
    let outcome = pipeline.export(quiz_id, "token").await.unwrap();
    assert_eq!(
        outcome,
        ExportOutcome::Failed(FailureReason::CanvasExportError)
    );

    // failed → exporting_to_canvas 合法，换一个正常的 Canvas 再导一次
    let healthy = Arc::new(ScriptedCanvas::all_success());
    let retry_pipeline = build_pipeline(store.clone(), healthy);
    let outcome = retry_pipeline.export(quiz_id, "token").await.unwrap();
    assert_eq!(outcome, ExportOutcome::Published);
}

#[tokio::test]
async fn test_already_exported_short_circuits() {
    let store: Arc<InMemoryQuizStore> = Arc::new(InMemoryQuizStore::new());
    let mut quiz = manual_quiz(vec![]);
    quiz.status = QuizStatus::Published;
    quiz.canvas_quiz_id = Some("canvas-quiz-1".to_string());
    let quiz_id = quiz.id;
    store.insert_quiz(quiz).await.unwrap();

    let canvas = Arc::new(ScriptedCanvas::all_success());
    let pipeline = build_pipeline(store.clone(), canvas.clone());

    let outcome = pipeline.export(quiz_id, "token").await.unwrap();
    assert_eq!(outcome, ExportOutcome::AlreadyExported);
    // 零外部调用
    assert_eq!(canvas.create_calls.load(Ordering::SeqCst), 0);
    assert_eq!(canvas.export_calls.load(Ordering::SeqCst), 0);
    assert_eq!(canvas.delete_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_partial_review_cannot_export() {
    let store: Arc<InMemoryQuizStore> = Arc::new(InMemoryQuizStore::new());
    let mut quiz = manual_quiz(vec![true_false_batch(2)]);
    quiz.status = QuizStatus::ReadyForReviewPartial;
    let quiz_id = quiz.id;
    store.insert_quiz(quiz).await.unwrap();

    let canvas = Arc::new(ScriptedCanvas::all_success());
    let pipeline = build_pipeline(store.clone(), canvas.clone());

    let outcome = pipeline.export(quiz_id, "token").await.unwrap();
    assert_eq!(outcome, ExportOutcome::Skipped);
    assert_eq!(canvas.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_zero_approved_questions_fails_before_external_calls() {
    let store: Arc<InMemoryQuizStore> = Arc::new(InMemoryQuizStore::new());
    let quiz = manual_quiz(vec![true_false_batch(2)]);
    let quiz_id = quiz.id;
    store.insert_quiz(quiz).await.unwrap();

    let canvas = Arc::new(ScriptedCanvas::all_success());
    let pipeline = build_pipeline(store.clone(), canvas.clone());

    pipeline.run(quiz_id, "token").await.unwrap();
    // 不审核任何题目，直接导出
    let outcome = pipeline.export(quiz_id, "token").await.unwrap();
    assert_eq!(
        outcome,
        ExportOutcome::Failed(FailureReason::NoApprovedQuestions)
    );
    assert_eq!(canvas.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_run_all_processes_every_quiz() {
    let store: Arc<InMemoryQuizStore> = Arc::new(InMemoryQuizStore::new());
    let mut quiz_ids = Vec::new();
    for _ in 0..4 {
        let quiz = manual_quiz(vec![true_false_batch(2)]);
        quiz_ids.push(quiz.id);
        store.insert_quiz(quiz).await.unwrap();
    }

    let canvas = Arc::new(ScriptedCanvas::all_success());
    let pipeline = build_pipeline(store.clone(), canvas);

    let (success, failed) = pipeline.run_all(quiz_ids.clone(), "token").await;
    assert_eq!(success, 4);
    assert_eq!(failed, 0);

    for quiz_id in quiz_ids {
        let quiz = store.get_quiz(quiz_id).await.unwrap();
        assert_eq!(quiz.status, QuizStatus::ReadyForReview);
    }
}
