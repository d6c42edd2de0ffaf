//! 批次进度跟踪 - 编排层
//!
//! 生成阶段结束时由它合并批次结果、判定 Quiz 的最终去向。
//! 合并满足交换律和幂等性：同一批结果合并任意多次、
//! 以任意顺序合并，得到的集合都一样。

use std::collections::BTreeSet;

use crate::models::quiz::{GenerationMetadata, Quiz};
use crate::models::status::{FailureReason, QuizStatus};

/// 合并一轮批次结果
///
/// 成功优先：一个键同时出现在成功和失败里时按成功算
/// （重跑只会把失败的键变成功，不会反过来），
/// 因此键永远不会同时留在两个集合里。
pub fn merge(
    previous: &GenerationMetadata,
    successes: &BTreeSet<String>,
    failures: &BTreeSet<String>,
) -> GenerationMetadata {
    let successful_batches: BTreeSet<String> = previous
        .successful_batches
        .union(successes)
        .cloned()
        .collect();
    let failed_batches: BTreeSet<String> = previous
        .failed_batches
        .union(failures)
        .filter(|key| !successful_batches.contains(*key))
        .cloned()
        .collect();
    GenerationMetadata {
        successful_batches,
        failed_batches,
    }
}

/// 声明的批次是否全部成功
pub fn is_complete(quiz: &Quiz, metadata: &GenerationMetadata) -> bool {
    quiz.declared_batch_keys()
        .iter()
        .all(|key| metadata.successful_batches.contains(&key.storage_key()))
}

/// 是否部分成功（有成功也有失败）
pub fn is_partial(metadata: &GenerationMetadata) -> bool {
    !metadata.successful_batches.is_empty() && !metadata.failed_batches.is_empty()
}

/// 根据合并后的进度判定生成阶段的落点
///
/// 没有声明任何批次的 Quiz 不可能产出题目，直接判失败。
pub fn final_status(
    quiz: &Quiz,
    metadata: &GenerationMetadata,
) -> (QuizStatus, Option<FailureReason>) {
    if quiz.declared_batch_keys().is_empty() {
        return (
            QuizStatus::Failed,
            Some(FailureReason::NoQuestionsGenerated),
        );
    }
    if is_complete(quiz, metadata) {
        (QuizStatus::ReadyForReview, None)
    } else if metadata.successful_batches.is_empty() {
        (
            QuizStatus::Failed,
            Some(FailureReason::LlmGenerationError),
        )
    } else {
        (QuizStatus::ReadyForReviewPartial, None)
    }
}
