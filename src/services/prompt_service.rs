//! Prompt 模板服务 - 业务能力层
//!
//! 只负责"把一个批次的需求变成 LLM 消息"，不关心流程：
//! - 按题型解析模板，填入模块内容和生成参数
//! - 提供解析失败后的纠错 prompt
//! - 不出现 Vec<Question>，不关心批次调度

use crate::clients::ChatMessage;
use crate::models::question::{Difficulty, QuestionType};
use crate::models::quiz::{ContentChunk, QuizLanguage};

/// 单个批次的生成参数
#[derive(Debug, Clone)]
pub struct PromptParams<'a> {
    pub module_name: &'a str,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub count: u32,
    pub language: QuizLanguage,
}

/// Prompt 模板服务
pub struct PromptService {
    /// 拼接模块内容时的单词上限（避免上下文超长）
    max_content_words: usize,
}

impl PromptService {
    pub fn new() -> Self {
        Self {
            max_content_words: 6000,
        }
    }

    pub fn with_content_limit(max_content_words: usize) -> Self {
        Self { max_content_words }
    }

    /// 构建生成消息（system + user）
    pub fn build_generation_messages(
        &self,
        params: &PromptParams<'_>,
        chunks: &[ContentChunk],
    ) -> Vec<ChatMessage> {
        let system_message = format!(
            "You are an expert educator creating quiz questions from course material. \
             Write all questions in {}. \
             Respond ONLY with a JSON array, no prose and no markdown fences. \
             Every question must be answerable from the provided material alone.",
            params.language.as_str()
        );

        let user_message = format!(
            r#"Create exactly {count} {difficulty} {type_name} questions from the course module "{module}".

{schema}

Course material:
{content}

Return a JSON array with exactly {count} objects matching the schema above."#,
            count = params.count,
            difficulty = params.difficulty,
            type_name = type_display_name(params.question_type),
            module = params.module_name,
            schema = schema_instructions(params.question_type),
            content = self.join_content(chunks),
        );

        vec![
            ChatMessage::system(system_message),
            ChatMessage::user(user_message),
        ]
    }

    /// 构建纠错消息：把上一轮的输出和解码错误一起发回去
    pub fn build_correction_messages(
        &self,
        params: &PromptParams<'_>,
        previous_output: &str,
        decode_error: &str,
    ) -> Vec<ChatMessage> {
        let system_message =
            "You are a JSON repair assistant. Respond ONLY with the corrected JSON array, \
             no prose and no markdown fences.";

        let user_message = format!(
            r#"Your previous response could not be parsed as JSON.

Parse error: {error}

{schema}

Previous response:
{previous}

Return the same questions as a valid JSON array matching the schema above."#,
            error = decode_error,
            schema = schema_instructions(params.question_type),
            previous = previous_output,
        );

        vec![
            ChatMessage::system(system_message),
            ChatMessage::user(user_message),
        ]
    }

    /// 拼接内容段，超出单词上限的部分截断
    fn join_content(&self, chunks: &[ContentChunk]) -> String {
        let mut words_used = 0;
        let mut parts = Vec::new();
        for chunk in chunks {
            if words_used >= self.max_content_words {
                break;
            }
            if words_used + chunk.word_count <= self.max_content_words {
                words_used += chunk.word_count;
                parts.push(chunk.text.clone());
            } else {
                let remaining = self.max_content_words - words_used;
                let truncated: String = chunk
                    .text
                    .split_whitespace()
                    .take(remaining)
                    .collect::<Vec<_>>()
                    .join(" ");
                parts.push(truncated);
                break;
            }
        }
        parts.join("\n\n")
    }
}

impl Default for PromptService {
    fn default() -> Self {
        Self::new()
    }
}

fn type_display_name(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::MultipleChoice => "multiple-choice",
        QuestionType::TrueFalse => "true/false",
        QuestionType::FillInBlank => "fill-in-the-blank",
        QuestionType::Matching => "matching",
        QuestionType::Categorization => "categorization",
    }
}

/// 每种题型要求的 JSON 结构说明
fn schema_instructions(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::MultipleChoice => {
            r#"Each object must have this shape:
{"question_text": "...", "option_a": "...", "option_b": "...", "option_c": "...", "option_d": "...", "correct_answer": "A", "explanation": "..."}
"correct_answer" must be exactly one of "A", "B", "C", "D"."#
        }
        QuestionType::TrueFalse => {
            r#"Each object must have this shape:
{"question_text": "...", "correct_answer": true, "explanation": "..."}
"correct_answer" must be a JSON boolean."#
        }
        QuestionType::FillInBlank => {
            r#"Each object must have this shape:
{"question_text": "The capital of France is [blank_1].", "blanks": [{"position": 1, "correct_answer": "Paris", "answer_variations": ["paris"], "case_sensitive": false}], "explanation": "..."}
Mark each blank in the text as [blank_N]."#
        }
        QuestionType::Matching => {
            r#"Each object must have this shape:
{"question_text": "...", "pairs": [{"question": "...", "answer": "..."}], "distractors": ["..."], "explanation": "..."}
Provide at least 3 pairs; answers must be distinct; distractors must not equal any answer."#
        }
        QuestionType::Categorization => {
            r#"Each object must have this shape:
{"question_text": "...", "categories": ["..."], "items": ["..."], "assignments": [{"item": "...", "category": "..."}], "distractors": [], "explanation": "..."}
Every item must be assigned to exactly one of the listed categories."#
        }
    }
}
