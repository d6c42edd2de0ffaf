//! Quiz 聚合根
//!
//! Quiz 是整个流水线唯一的共享可变资源：
//! 所有修改都必须经过 store 的事务性 `try_transition`（单写者语义）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

use crate::models::question::{Difficulty, QuestionType};
use crate::models::status::{FailureReason, QuizStatus};

/// 模块来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleSource {
    /// 从 Canvas 课程模块提取
    Canvas,
    /// 教师手动粘贴的内容
    Manual,
}

/// 出题语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizLanguage {
    English,
    Norwegian,
}

impl QuizLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizLanguage::English => "English",
            QuizLanguage::Norwegian => "Norwegian",
        }
    }
}

/// 一个生成批次的需求：题型 × 难度 × 数量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBatch {
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub count: u32,
}

/// 被选中的课程模块
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSelection {
    pub name: String,
    pub source_type: ModuleSource,
    /// 手动模块自带的内容（canvas 模块为 None，内容走提取阶段）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub question_batches: Vec<QuestionBatch>,
}

/// 提取出来的一段内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChunk {
    pub text: String,
    pub word_count: usize,
}

impl ContentChunk {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        Self { text, word_count }
    }
}

/// 批次键：生成工作的幂等单元
///
/// 内部始终用结构化形式，下划线拼接的字符串只用于存储和日志
/// （模块 ID 本身可能含下划线，字符串形式不保证可以反解）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub module_id: String,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub count: u32,
}

impl BatchKey {
    pub fn new(
        module_id: impl Into<String>,
        question_type: QuestionType,
        difficulty: Difficulty,
        count: u32,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            question_type,
            difficulty,
            count,
        }
    }

    /// 存储形式：`{module_id}_{question_type}_{difficulty}_{count}`
    pub fn storage_key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.module_id, self.question_type, self.difficulty, self.count
        )
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

/// 批次生成进度（持久化在 Quiz 上）
///
/// 接口形状：`{"successful_batches": [string], "failed_batches": [string]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    #[serde(default)]
    pub successful_batches: BTreeSet<String>,
    #[serde(default)]
    pub failed_batches: BTreeSet<String>,
}

/// Quiz 聚合根
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub title: String,
    pub canvas_course_id: u64,
    pub status: QuizStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub selected_modules: HashMap<String, ModuleSelection>,
    /// 每次提取覆盖写入一次
    #[serde(default)]
    pub extracted_content: HashMap<String, Vec<ContentChunk>>,
    #[serde(default)]
    pub generation_metadata: GenerationMetadata,
    /// 创建时固定，生成/导出永远不重新计算
    pub target_question_count: u32,
    pub language: QuizLanguage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    pub llm_temperature: f32,
    /// 最多设置一次：设置后导出不可重复
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_quiz_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quiz {
    /// 创建新 Quiz（target_question_count 在这里一次性算定）
    pub fn new(
        title: impl Into<String>,
        canvas_course_id: u64,
        selected_modules: HashMap<String, ModuleSelection>,
        language: QuizLanguage,
    ) -> Self {
        let target_question_count = selected_modules
            .values()
            .flat_map(|m| m.question_batches.iter())
            .map(|b| b.count)
            .sum();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            canvas_course_id,
            status: QuizStatus::Created,
            failure_reason: None,
            selected_modules,
            extracted_content: HashMap::new(),
            generation_metadata: GenerationMetadata::default(),
            target_question_count,
            language,
            llm_model: None,
            llm_temperature: 0.7,
            canvas_quiz_id: None,
            exported_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Quiz 声明的全部批次键（模块 × 批次需求）
    pub fn declared_batch_keys(&self) -> Vec<BatchKey> {
        let mut keys: Vec<BatchKey> = self
            .selected_modules
            .iter()
            .flat_map(|(module_id, module)| {
                module.question_batches.iter().map(move |batch| {
                    BatchKey::new(
                        module_id.clone(),
                        batch.question_type,
                        batch.difficulty,
                        batch.count,
                    )
                })
            })
            .collect();
        // HashMap 遍历顺序不稳定，排序让日志和测试可预期
        keys.sort_by(|a, b| a.storage_key().cmp(&b.storage_key()));
        keys
    }

    /// 某个模块的内容（提取结果优先，手动内容兜底）
    pub fn module_content(&self, module_id: &str) -> Vec<ContentChunk> {
        if let Some(chunks) = self.extracted_content.get(module_id) {
            return chunks.clone();
        }
        self.selected_modules
            .get(module_id)
            .and_then(|m| m.content.as_deref())
            .map(|c| vec![ContentChunk::new(c)])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_modules() -> HashMap<String, ModuleSelection> {
        let mut modules = HashMap::new();
        modules.insert(
            "173467".to_string(),
            ModuleSelection {
                name: "Week 1".to_string(),
                source_type: ModuleSource::Canvas,
                content: None,
                question_batches: vec![
                    QuestionBatch {
                        question_type: QuestionType::MultipleChoice,
                        difficulty: Difficulty::Medium,
                        count: 10,
                    },
                    QuestionBatch {
                        question_type: QuestionType::TrueFalse,
                        difficulty: Difficulty::Easy,
                        count: 5,
                    },
                ],
            },
        );
        modules
    }

    #[test]
    fn test_batch_key_storage_form() {
        let key = BatchKey::new("173467", QuestionType::MultipleChoice, Difficulty::Medium, 10);
        assert_eq!(key.storage_key(), "173467_multiple_choice_medium_10");
    }

    #[test]
    fn test_target_count_fixed_at_creation() {
        let quiz = Quiz::new("测试", 37823, sample_modules(), QuizLanguage::English);
        assert_eq!(quiz.target_question_count, 15);
    }

    #[test]
    fn test_declared_batch_keys() {
        let quiz = Quiz::new("测试", 37823, sample_modules(), QuizLanguage::English);
        let keys = quiz.declared_batch_keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].storage_key(), "173467_multiple_choice_medium_10");
        assert_eq!(keys[1].storage_key(), "173467_true_false_easy_5");
    }

    #[test]
    fn test_metadata_wire_shape() {
        let mut meta = GenerationMetadata::default();
        meta.successful_batches.insert("m1_true_false_easy_5".to_string());
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "successful_batches": ["m1_true_false_easy_5"],
                "failed_batches": []
            })
        );
    }

    #[test]
    fn test_manual_module_content_fallback() {
        let mut modules = HashMap::new();
        modules.insert(
            "manual_1".to_string(),
            ModuleSelection {
                name: "讲义".to_string(),
                source_type: ModuleSource::Manual,
                content: Some("光合作用把光能转化为化学能。".to_string()),
                question_batches: vec![],
            },
        );
        let quiz = Quiz::new("测试", 1, modules, QuizLanguage::English);
        let chunks = quiz.module_content("manual_1");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("光合作用"));
    }
}
