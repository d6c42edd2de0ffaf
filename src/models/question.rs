//! 题目数据模型
//!
//! `QuestionPayload` 是封闭的 sum type：每种题型一个变体，
//! 转换器里用穷举 match，不存在"鸭子类型字典"。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 题目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    FillInBlank,
    Matching,
    Categorization,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::FillInBlank => "fill_in_blank",
            QuestionType::Matching => "matching",
            QuestionType::Categorization => "categorization",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 题目难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 选择题正确选项（A/B/C/D）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Letter {
    A,
    B,
    C,
    D,
}

impl Letter {
    /// 对应的选项下标：A=0 … D=3
    pub fn index(&self) -> usize {
        match self {
            Letter::A => 0,
            Letter::B => 1,
            Letter::C => 2,
            Letter::D => 3,
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Letter> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Letter::A),
            "B" => Some(Letter::B),
            "C" => Some(Letter::C),
            "D" => Some(Letter::D),
            _ => None,
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Letter::A => "A",
            Letter::B => "B",
            Letter::C => "C",
            Letter::D => "D",
        };
        write!(f, "{}", s)
    }
}

/// 填空题的一个空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blank {
    /// 空位编号（在题干中的位置，从 1 开始）
    pub position: u32,
    /// 标准答案
    pub correct_answer: String,
    /// 可接受的答案变体
    #[serde(default)]
    pub answer_variations: Vec<String>,
    /// 是否大小写敏感（敏感时导出为精确匹配）
    #[serde(default)]
    pub case_sensitive: bool,
}

/// 匹配题的一对
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingPair {
    pub question: String,
    pub answer: String,
}

/// 分类题的一条归属关系
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub item: String,
    pub category: String,
}

/// 题目载荷（按题型区分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionPayload {
    MultipleChoice {
        question_text: String,
        option_a: String,
        option_b: String,
        option_c: String,
        option_d: String,
        correct_answer: Letter,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    TrueFalse {
        question_text: String,
        correct_answer: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    FillInBlank {
        question_text: String,
        blanks: Vec<Blank>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    Matching {
        question_text: String,
        pairs: Vec<MatchingPair>,
        #[serde(default)]
        distractors: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
    Categorization {
        question_text: String,
        categories: Vec<String>,
        items: Vec<String>,
        assignments: Vec<CategoryAssignment>,
        #[serde(default)]
        distractors: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
    },
}

impl QuestionPayload {
    /// 载荷对应的题型
    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionPayload::MultipleChoice { .. } => QuestionType::MultipleChoice,
            QuestionPayload::TrueFalse { .. } => QuestionType::TrueFalse,
            QuestionPayload::FillInBlank { .. } => QuestionType::FillInBlank,
            QuestionPayload::Matching { .. } => QuestionType::Matching,
            QuestionPayload::Categorization { .. } => QuestionType::Categorization,
        }
    }

    /// 题干文本
    pub fn question_text(&self) -> &str {
        match self {
            QuestionPayload::MultipleChoice { question_text, .. }
            | QuestionPayload::TrueFalse { question_text, .. }
            | QuestionPayload::FillInBlank { question_text, .. }
            | QuestionPayload::Matching { question_text, .. }
            | QuestionPayload::Categorization { question_text, .. } => question_text,
        }
    }
}

/// 一道生成出来的题目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub quiz_id: Uuid,
    /// 来源模块（批次归属）
    pub module_id: String,
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub payload: QuestionPayload,
    /// 只有审核通过的题目才能导出
    pub is_approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// 由生成工作流创建（初始未审核）
    pub fn new(
        quiz_id: Uuid,
        module_id: impl Into<String>,
        difficulty: Difficulty,
        payload: QuestionPayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            quiz_id,
            module_id: module_id.into(),
            question_type: payload.question_type(),
            difficulty,
            payload,
            is_approved: false,
            approved_at: None,
            created_at: Utc::now(),
        }
    }

    /// 标记审核通过
    pub fn approve(&mut self) {
        self.is_approved = true;
        self.approved_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_index() {
        assert_eq!(Letter::A.index(), 0);
        assert_eq!(Letter::B.index(), 1);
        assert_eq!(Letter::C.index(), 2);
        assert_eq!(Letter::D.index(), 3);
    }

    #[test]
    fn test_letter_from_str_loose() {
        assert_eq!(Letter::from_str_loose(" b "), Some(Letter::B));
        assert_eq!(Letter::from_str_loose("d"), Some(Letter::D));
        assert_eq!(Letter::from_str_loose("E"), None);
    }

    #[test]
    fn test_payload_question_type() {
        let payload = QuestionPayload::TrueFalse {
            question_text: "地球是圆的。".to_string(),
            correct_answer: true,
            explanation: None,
        };
        assert_eq!(payload.question_type(), QuestionType::TrueFalse);
    }

    #[test]
    fn test_question_approve() {
        let payload = QuestionPayload::TrueFalse {
            question_text: "1+1=2".to_string(),
            correct_answer: true,
            explanation: None,
        };
        let mut q = Question::new(Uuid::new_v4(), "m1", Difficulty::Easy, payload);
        assert!(!q.is_approved);
        q.approve();
        assert!(q.is_approved);
        assert!(q.approved_at.is_some());
    }
}
