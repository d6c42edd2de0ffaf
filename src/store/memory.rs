//! 内存实现
//!
//! 一把 `tokio::sync::Mutex` 就是事务边界：`try_transition` 的
//! 读-校验-写全程持锁，行为上等价于数据库的行锁条件更新。
//! 生产环境换成真实数据库时只需要另写一个 `QuizStore` 实现。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::question::Question;
use crate::models::quiz::Quiz;
use crate::models::status::{validate_transition, QuizStatus};
use crate::store::{QuizMutator, QuizStore, TransitionOutcome};

#[derive(Default)]
struct StoreInner {
    quizzes: HashMap<Uuid, Quiz>,
    questions: HashMap<Uuid, Question>,
}

/// 内存版 QuizStore
#[derive(Default)]
pub struct InMemoryQuizStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryQuizStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuizStore for InMemoryQuizStore {
    async fn insert_quiz(&self, quiz: Quiz) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.quizzes.insert(quiz.id, quiz);
        Ok(())
    }

    async fn get_quiz(&self, quiz_id: Uuid) -> AppResult<Quiz> {
        let inner = self.inner.lock().await;
        inner
            .quizzes
            .get(&quiz_id)
            .cloned()
            .ok_or_else(|| AppError::quiz_not_found(quiz_id.to_string()))
    }

    async fn try_transition(
        &self,
        quiz_id: Uuid,
        to: QuizStatus,
        mutator: Option<QuizMutator>,
    ) -> AppResult<TransitionOutcome> {
        let mut inner = self.inner.lock().await;
        let quiz = inner
            .quizzes
            .get_mut(&quiz_id)
            .ok_or_else(|| AppError::quiz_not_found(quiz_id.to_string()))?;

        let from = quiz.status;
        if !validate_transition(from, to) {
            return Ok(TransitionOutcome::Rejected { from, to });
        }

        if let Some(mutator) = mutator {
            mutator(quiz);
        }
        quiz.status = to;
        quiz.updated_at = Utc::now();

        Ok(TransitionOutcome::Applied(quiz.clone()))
    }

    async fn try_claim(&self, quiz_id: Uuid, to: QuizStatus) -> AppResult<TransitionOutcome> {
        let mut inner = self.inner.lock().await;
        let quiz = inner
            .quizzes
            .get_mut(&quiz_id)
            .ok_or_else(|| AppError::quiz_not_found(quiz_id.to_string()))?;

        let from = quiz.status;
        if from == to || !validate_transition(from, to) {
            return Ok(TransitionOutcome::Rejected { from, to });
        }

        quiz.status = to;
        quiz.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied(quiz.clone()))
    }

    async fn insert_questions(&self, questions: Vec<Question>) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        for question in questions {
            inner.questions.insert(question.id, question);
        }
        Ok(())
    }

    async fn questions_for_quiz(&self, quiz_id: Uuid) -> AppResult<Vec<Question>> {
        let inner = self.inner.lock().await;
        let mut questions: Vec<Question> = inner
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.created_at);
        Ok(questions)
    }

    async fn approved_questions(&self, quiz_id: Uuid) -> AppResult<Vec<Question>> {
        let questions = self.questions_for_quiz(quiz_id).await?;
        Ok(questions.into_iter().filter(|q| q.is_approved).collect())
    }

    async fn approve_question(&self, question_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.questions.get_mut(&question_id) {
            Some(question) => {
                question.approve();
                Ok(())
            }
            None => Err(AppError::quiz_not_found(question_id.to_string())),
        }
    }
}
