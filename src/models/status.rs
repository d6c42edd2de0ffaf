//! Quiz 生命周期状态机
//!
//! 定义 Quiz 的全部合法状态和状态迁移表。
//! `validate_transition` 是纯函数：只做判断，不改任何状态。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quiz 生命周期状态
///
/// 序列化为固定的 snake_case 字符串（持久化/接口两侧都依赖这些值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    /// 刚创建，还没有任何阶段执行过
    Created,
    /// 正在提取课程内容
    ExtractingContent,
    /// 正在生成题目
    GeneratingQuestions,
    /// 全部批次生成成功，等待人工审核
    ReadyForReview,
    /// 部分批次生成成功（可以重新生成失败批次，但不允许导出）
    ReadyForReviewPartial,
    /// 正在导出到 Canvas
    ExportingToCanvas,
    /// 导出完成（唯一的终态）
    Published,
    /// 某个阶段失败（可以重试）
    Failed,
}

impl QuizStatus {
    /// 全部状态（用于遍历迁移表）
    pub const ALL: [QuizStatus; 8] = [
        QuizStatus::Created,
        QuizStatus::ExtractingContent,
        QuizStatus::GeneratingQuestions,
        QuizStatus::ReadyForReview,
        QuizStatus::ReadyForReviewPartial,
        QuizStatus::ExportingToCanvas,
        QuizStatus::Published,
        QuizStatus::Failed,
    ];

    /// 持久化用的字符串形式
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizStatus::Created => "created",
            QuizStatus::ExtractingContent => "extracting_content",
            QuizStatus::GeneratingQuestions => "generating_questions",
            QuizStatus::ReadyForReview => "ready_for_review",
            QuizStatus::ReadyForReviewPartial => "ready_for_review_partial",
            QuizStatus::ExportingToCanvas => "exporting_to_canvas",
            QuizStatus::Published => "published",
            QuizStatus::Failed => "failed",
        }
    }

    /// 是否是"进行中"状态（允许自迁移，用于建模预约检查）
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            QuizStatus::ExtractingContent
                | QuizStatus::GeneratingQuestions
                | QuizStatus::ExportingToCanvas
        )
    }
}

impl fmt::Display for QuizStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// 内容提取阶段出错
    ContentExtractionError,
    /// 选中的模块没有任何可用内容
    NoContentFound,
    /// LLM 生成阶段出错（所有批次都失败）
    LlmGenerationError,
    /// 生成结束后一道题都没有
    NoQuestionsGenerated,
    /// 导出时没有任何已审核通过的题目
    NoApprovedQuestions,
    /// Canvas 导出阶段出错
    CanvasExportError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::ContentExtractionError => "content_extraction_error",
            FailureReason::NoContentFound => "no_content_found",
            FailureReason::LlmGenerationError => "llm_generation_error",
            FailureReason::NoQuestionsGenerated => "no_questions_generated",
            FailureReason::NoApprovedQuestions => "no_approved_questions",
            FailureReason::CanvasExportError => "canvas_export_error",
        };
        write!(f, "{}", s)
    }
}

/// 校验一次状态迁移是否合法
///
/// 迁移表：
/// - `created → extracting_content`，`failed → extracting_content`（重试）
/// - `extracting_content → generating_questions`，`failed → generating_questions`，
///   `ready_for_review_partial → generating_questions`（只重新生成失败批次）
/// - `generating_questions → ready_for_review | ready_for_review_partial`
/// - `ready_for_review → exporting_to_canvas`，`failed → exporting_to_canvas`
/// - **`ready_for_review_partial → exporting_to_canvas` 不合法**：不完整的题目集不允许导出
/// - `exporting_to_canvas → published`
/// - 除 `published` 外任何状态 `→ failed` 都合法
/// - 进行中状态允许自迁移（预约检查会触发，例如 `extracting_content → extracting_content`）
pub fn validate_transition(from: QuizStatus, to: QuizStatus) -> bool {
    use QuizStatus::*;

    // 进行中状态的自迁移
    if from == to && from.is_in_progress() {
        return true;
    }

    match (from, to) {
        // 进入内容提取
        (Created, ExtractingContent) | (Failed, ExtractingContent) => true,
        // 进入题目生成
        (ExtractingContent, GeneratingQuestions)
        | (Failed, GeneratingQuestions)
        | (ReadyForReviewPartial, GeneratingQuestions) => true,
        // 生成结束
        (GeneratingQuestions, ReadyForReview) | (GeneratingQuestions, ReadyForReviewPartial) => {
            true
        }
        // 进入导出（partial 不允许）
        (ReadyForReview, ExportingToCanvas) | (Failed, ExportingToCanvas) => true,
        // 导出完成
        (ExportingToCanvas, Published) => true,
        // 失败：published 之外的任何状态都可以进入
        (from, Failed) if from != Published => true,
        _ => false,
    }
}
