//! 生成内容结构校验 - 业务能力层
//!
//! 把解析出来的 JSON 条目逐个变成 `QuestionPayload`：
//! 必填字段存在且非空、长度在界内、选择题答案在 A-D、
//! 匹配/分类题的语义规则成立。单个条目失败只丢弃该条目，
//! 不直接否定整个批次（数量够不够由批次流程判断）。

use serde_json::Value;

use crate::error::ValidationError;
use crate::models::question::{
    Blank, CategoryAssignment, Letter, MatchingPair, QuestionPayload, QuestionType,
};

/// 长度上限
const QUESTION_TEXT_MAX: usize = 2000;
const OPTION_MAX: usize = 500;
const ANSWER_MAX: usize = 500;

/// 把一个 JSON 条目校验并构建成载荷
pub fn validate_item(
    question_type: QuestionType,
    value: &Value,
) -> Result<QuestionPayload, ValidationError> {
    let payload = build_payload(question_type, value)?;
    validate_payload(&payload)?;
    Ok(payload)
}

/// 校验已构建的载荷（转换器导出前也会调用）
pub fn validate_payload(payload: &QuestionPayload) -> Result<(), ValidationError> {
    match payload {
        QuestionPayload::MultipleChoice {
            question_text,
            option_a,
            option_b,
            option_c,
            option_d,
            ..
        } => {
            check_text("multiple_choice", "question_text", question_text, QUESTION_TEXT_MAX)?;
            check_text("multiple_choice", "option_a", option_a, OPTION_MAX)?;
            check_text("multiple_choice", "option_b", option_b, OPTION_MAX)?;
            check_text("multiple_choice", "option_c", option_c, OPTION_MAX)?;
            check_text("multiple_choice", "option_d", option_d, OPTION_MAX)?;
            Ok(())
        }
        QuestionPayload::TrueFalse { question_text, .. } => {
            check_text("true_false", "question_text", question_text, QUESTION_TEXT_MAX)
        }
        QuestionPayload::FillInBlank {
            question_text,
            blanks,
            ..
        } => {
            check_text("fill_in_blank", "question_text", question_text, QUESTION_TEXT_MAX)?;
            if blanks.is_empty() {
                return Err(ValidationError::TooFewItems {
                    question_type: "fill_in_blank",
                    min: 1,
                    actual: 0,
                });
            }
            for blank in blanks {
                check_text("fill_in_blank", "correct_answer", &blank.correct_answer, ANSWER_MAX)?;
                for variation in &blank.answer_variations {
                    check_text("fill_in_blank", "answer_variations", variation, ANSWER_MAX)?;
                }
            }
            Ok(())
        }
        QuestionPayload::Matching {
            question_text,
            pairs,
            distractors,
            ..
        } => {
            check_text("matching", "question_text", question_text, QUESTION_TEXT_MAX)?;
            if pairs.len() < 2 {
                return Err(ValidationError::TooFewItems {
                    question_type: "matching",
                    min: 2,
                    actual: pairs.len(),
                });
            }
            // 答案不允许重复（大小写不敏感），干扰项不允许撞正确答案
            let mut seen: Vec<String> = Vec::new();
            for pair in pairs {
                check_text("matching", "question", &pair.question, ANSWER_MAX)?;
                check_text("matching", "answer", &pair.answer, ANSWER_MAX)?;
                let lowered = pair.answer.trim().to_lowercase();
                if seen.contains(&lowered) {
                    return Err(ValidationError::DuplicateAnswer {
                        answer: pair.answer.clone(),
                    });
                }
                seen.push(lowered);
            }
            for distractor in distractors {
                check_text("matching", "distractors", distractor, ANSWER_MAX)?;
                if seen.contains(&distractor.trim().to_lowercase()) {
                    return Err(ValidationError::DistractorCollision {
                        distractor: distractor.clone(),
                    });
                }
            }
            Ok(())
        }
        QuestionPayload::Categorization {
            question_text,
            categories,
            items,
            assignments,
            ..
        } => {
            check_text("categorization", "question_text", question_text, QUESTION_TEXT_MAX)?;
            if categories.len() < 2 {
                return Err(ValidationError::TooFewItems {
                    question_type: "categorization",
                    min: 2,
                    actual: categories.len(),
                });
            }
            if items.is_empty() {
                return Err(ValidationError::TooFewItems {
                    question_type: "categorization",
                    min: 1,
                    actual: 0,
                });
            }
            // 每个条目必须恰好归属一个存在的分类
            for item in items {
                let matched: Vec<&CategoryAssignment> =
                    assignments.iter().filter(|a| &a.item == item).collect();
                match matched.len() {
                    0 => {
                        return Err(ValidationError::UnassignedItem { item: item.clone() });
                    }
                    1 => {
                        let category = &matched[0].category;
                        if !categories.contains(category) {
                            return Err(ValidationError::UnknownCategory {
                                item: item.clone(),
                                category: category.clone(),
                            });
                        }
                    }
                    _ => {
                        return Err(ValidationError::DoubleAssignedItem { item: item.clone() });
                    }
                }
            }
            Ok(())
        }
    }
}

// ========== 按题型构建载荷 ==========

fn build_payload(
    question_type: QuestionType,
    value: &Value,
) -> Result<QuestionPayload, ValidationError> {
    match question_type {
        QuestionType::MultipleChoice => {
            let correct_raw = str_field(value, "multiple_choice", "correct_answer")?;
            let correct_answer = Letter::from_str_loose(&correct_raw).ok_or(
                ValidationError::InvalidCorrectAnswer { got: correct_raw },
            )?;
            Ok(QuestionPayload::MultipleChoice {
                question_text: str_field(value, "multiple_choice", "question_text")?,
                option_a: str_field(value, "multiple_choice", "option_a")?,
                option_b: str_field(value, "multiple_choice", "option_b")?,
                option_c: str_field(value, "multiple_choice", "option_c")?,
                option_d: str_field(value, "multiple_choice", "option_d")?,
                correct_answer,
                explanation: opt_str_field(value, "explanation"),
            })
        }
        QuestionType::TrueFalse => {
            let correct_answer = match value.get("correct_answer") {
                Some(Value::Bool(b)) => *b,
                Some(other) => {
                    return Err(ValidationError::InvalidCorrectAnswer {
                        got: other.to_string(),
                    })
                }
                None => {
                    return Err(ValidationError::MissingField {
                        question_type: "true_false",
                        field: "correct_answer",
                    })
                }
            };
            Ok(QuestionPayload::TrueFalse {
                question_text: str_field(value, "true_false", "question_text")?,
                correct_answer,
                explanation: opt_str_field(value, "explanation"),
            })
        }
        QuestionType::FillInBlank => {
            let raw_blanks = array_field(value, "fill_in_blank", "blanks")?;
            let mut blanks = Vec::with_capacity(raw_blanks.len());
            for (index, raw) in raw_blanks.iter().enumerate() {
                let position = raw
                    .get("position")
                    .and_then(Value::as_u64)
                    .unwrap_or(index as u64 + 1) as u32;
                blanks.push(Blank {
                    position,
                    correct_answer: str_field(raw, "fill_in_blank", "correct_answer")?,
                    answer_variations: str_array(raw.get("answer_variations")),
                    case_sensitive: raw
                        .get("case_sensitive")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                });
            }
            Ok(QuestionPayload::FillInBlank {
                question_text: str_field(value, "fill_in_blank", "question_text")?,
                blanks,
                explanation: opt_str_field(value, "explanation"),
            })
        }
        QuestionType::Matching => {
            let raw_pairs = array_field(value, "matching", "pairs")?;
            let mut pairs = Vec::with_capacity(raw_pairs.len());
            for raw in &raw_pairs {
                pairs.push(MatchingPair {
                    question: str_field(raw, "matching", "question")?,
                    answer: str_field(raw, "matching", "answer")?,
                });
            }
            Ok(QuestionPayload::Matching {
                question_text: str_field(value, "matching", "question_text")?,
                pairs,
                distractors: str_array(value.get("distractors")),
                explanation: opt_str_field(value, "explanation"),
            })
        }
        QuestionType::Categorization => {
            let raw_assignments = array_field(value, "categorization", "assignments")?;
            let mut assignments = Vec::with_capacity(raw_assignments.len());
            for raw in &raw_assignments {
                assignments.push(CategoryAssignment {
                    item: str_field(raw, "categorization", "item")?,
                    category: str_field(raw, "categorization", "category")?,
                });
            }
            Ok(QuestionPayload::Categorization {
                question_text: str_field(value, "categorization", "question_text")?,
                categories: str_array(value.get("categories")),
                items: str_array(value.get("items")),
                assignments,
                distractors: str_array(value.get("distractors")),
                explanation: opt_str_field(value, "explanation"),
            })
        }
    }
}

// ========== 字段提取辅助 ==========

/// 必填字符串字段：存在、是字符串、trim 后非空
fn str_field(
    value: &Value,
    question_type: &'static str,
    field: &'static str,
) -> Result<String, ValidationError> {
    match value.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(ValidationError::MissingField {
            question_type,
            field,
        }),
    }
}

/// 可选字符串字段（空串当作没有）
fn opt_str_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 必填数组字段
fn array_field(
    value: &Value,
    question_type: &'static str,
    field: &'static str,
) -> Result<Vec<Value>, ValidationError> {
    match value.get(field).and_then(Value::as_array) {
        Some(items) => Ok(items.clone()),
        None => Err(ValidationError::MissingField {
            question_type,
            field,
        }),
    }
}

/// 字符串数组（缺省为空，非字符串条目丢弃）
fn str_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn check_text(
    question_type: &'static str,
    field: &'static str,
    text: &str,
    max: usize,
) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::MissingField {
            question_type,
            field,
        });
    }
    let len = text.chars().count();
    if len > max {
        return Err(ValidationError::FieldTooLong {
            field,
            max,
            actual: len,
        });
    }
    Ok(())
}
