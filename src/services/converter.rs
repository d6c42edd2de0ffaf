//! Canvas 题目格式转换器 - 业务能力层
//!
//! 纯函数、确定性：同一道题转换任意多次，输出逐字节相同。
//! 选项/空位/配对的标识符用 UUIDv5 从题目 id 派生，
//! 不依赖随机数也不依赖调用时刻。
//!
//! 语义不合法的载荷（答案重复、条目未归属等）在这里被拒绝，
//! 绝不静默纠正。

use phf::phf_map;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppResult, ConvertError};
use crate::models::question::{Letter, Question, QuestionPayload, QuestionType};
use crate::services::validator::validate_payload;

/// 派生选项/空位标识符的固定命名空间
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x6ba7_b810_9dad_11d1_80b4_00c0_4fd4_30c8);

/// 题型 → Canvas 交互类型 slug
static INTERACTION_SLUGS: phf::Map<&'static str, &'static str> = phf_map! {
    "multiple_choice" => "choice",
    "true_false" => "true-false",
    "fill_in_blank" => "rich-fill-blank",
    "matching" => "matching",
    "categorization" => "categorization",
};

/// 题型 → Canvas 评分算法
static SCORING_ALGORITHMS: phf::Map<&'static str, &'static str> = phf_map! {
    "multiple_choice" => "Equivalence",
    "true_false" => "Equivalence",
    "fill_in_blank" => "MultipleMethods",
    "matching" => "PartialDeep",
    "categorization" => "Categorization",
};

/// 把一道已审核的题目转换成 Canvas New Quizzes 条目
///
/// `position` 是条目在测验中的序号（从 1 开始）。
pub fn convert(question: &Question, position: u32) -> AppResult<Value> {
    if question.question_type != question.payload.question_type() {
        return Err(ConvertError {
            question_type: question.question_type.as_str(),
            expected: expected_shape(question.question_type),
            actual: question.payload.question_type().as_str().to_string(),
        }
        .into());
    }
    validate_payload(&question.payload)?;

    let type_key = question.question_type.as_str();
    let slug = table_entry(&INTERACTION_SLUGS, type_key, question.question_type)?;
    let algorithm = table_entry(&SCORING_ALGORITHMS, type_key, question.question_type)?;
    let (interaction_data, scoring_data) = match &question.payload {
        QuestionPayload::MultipleChoice {
            option_a,
            option_b,
            option_c,
            option_d,
            correct_answer,
            ..
        } => convert_multiple_choice(
            question.id,
            [option_a, option_b, option_c, option_d],
            *correct_answer,
        ),
        QuestionPayload::TrueFalse { correct_answer, .. } => (
            json!({"true_choice": "True", "false_choice": "False"}),
            json!({"value": correct_answer}),
        ),
        QuestionPayload::FillInBlank { blanks, .. } => convert_fill_in_blank(question.id, blanks),
        QuestionPayload::Matching {
            pairs, distractors, ..
        } => convert_matching(question.id, pairs, distractors),
        QuestionPayload::Categorization {
            categories,
            items,
            assignments,
            distractors,
            ..
        } => convert_categorization(question.id, categories, items, assignments, distractors),
    };

    Ok(json!({
        "item": {
            "entry_type": "Item",
            "position": position,
            "points_possible": 1,
            "entry": {
                "interaction_type_slug": slug,
                "item_body": html_body(question.payload.question_text()),
                "scoring_algorithm": algorithm,
                "interaction_data": interaction_data,
                "scoring_data": scoring_data,
            }
        }
    }))
}

// ========== 按题型构造 interaction / scoring 数据 ==========

fn convert_multiple_choice(
    question_id: Uuid,
    options: [&String; 4],
    correct: Letter,
) -> (Value, Value) {
    // 每个选项按 A..D 顺序派生一个稳定 id
    let ids: Vec<String> = (0..4)
        .map(|slot| slot_id(question_id, &format!("option_{}", slot)))
        .collect();
    let choices: Vec<Value> = options
        .iter()
        .zip(&ids)
        .enumerate()
        .map(|(index, (text, id))| {
            json!({
                "id": id,
                "position": index + 1,
                "item_body": html_body(text),
            })
        })
        .collect();

    // 评分值是正确选项的 id，绝不是字母本身
    let correct_id = ids[correct.index()].clone();
    (
        json!({"choices": choices}),
        json!({"value": correct_id}),
    )
}

fn convert_fill_in_blank(question_id: Uuid, blanks: &[crate::models::question::Blank]) -> (Value, Value) {
    let mut blank_entries = Vec::with_capacity(blanks.len());
    let mut scoring_entries = Vec::with_capacity(blanks.len());

    for blank in blanks {
        let id = slot_id(question_id, &format!("blank_{}", blank.position));
        // 大小写敏感时用精确匹配，否则允许大小写/空白的宽松匹配
        let method = if blank.case_sensitive {
            "TextEquivalence"
        } else {
            "TextCloseEnough"
        };

        let mut accepted = vec![json!({
            "value": blank.correct_answer,
            "scoring_algorithm": method,
        })];
        for variation in &blank.answer_variations {
            accepted.push(json!({
                "value": variation,
                "scoring_algorithm": method,
            }));
        }

        blank_entries.push(json!({
            "id": id,
            "position": blank.position,
            "answer_type": "openEntry",
        }));
        scoring_entries.push(json!({
            "id": id,
            "entries": accepted,
        }));
    }

    (
        json!({"blanks": blank_entries}),
        json!({"value": scoring_entries}),
    )
}

fn convert_matching(
    question_id: Uuid,
    pairs: &[crate::models::question::MatchingPair],
    distractors: &[String],
) -> (Value, Value) {
    let mut questions = Vec::with_capacity(pairs.len());
    let mut matches = Vec::with_capacity(pairs.len());
    let mut answers: Vec<&str> = Vec::new();

    for (index, pair) in pairs.iter().enumerate() {
        let id = slot_id(question_id, &format!("pair_{}", index));
        questions.push(json!({
            "id": id,
            "item_body": pair.question,
        }));
        matches.push(json!({
            "question_id": id,
            "question_body": pair.question,
            "answer_body": pair.answer,
        }));
        answers.push(&pair.answer);
    }
    for distractor in distractors {
        answers.push(distractor);
    }

    (
        json!({
            "questions": questions,
            "answers": answers,
        }),
        json!({
            "value": matches.clone(),
            "edit_data": {
                "matches": matches,
                "distractors": distractors,
            }
        }),
    )
}

fn convert_categorization(
    question_id: Uuid,
    categories: &[String],
    items: &[String],
    assignments: &[crate::models::question::CategoryAssignment],
    distractors: &[String],
) -> (Value, Value) {
    // 分类和条目都派生稳定 id；归属关系换算成 id 引用
    let category_ids: Vec<String> = (0..categories.len())
        .map(|slot| slot_id(question_id, &format!("category_{}", slot)))
        .collect();
    let item_ids: Vec<String> = (0..items.len())
        .map(|slot| slot_id(question_id, &format!("item_{}", slot)))
        .collect();

    let mut category_entries = serde_json::Map::new();
    for (category, id) in categories.iter().zip(&category_ids) {
        category_entries.insert(
            id.clone(),
            json!({"id": id, "item_body": category}),
        );
    }

    let mut item_entries = serde_json::Map::new();
    for (item, id) in items.iter().zip(&item_ids) {
        item_entries.insert(id.clone(), json!({"id": id, "item_body": item}));
    }

    // 每个分类整体判分（全对才得该分类的分）
    let mut scoring_entries = Vec::with_capacity(categories.len());
    for (category, category_id) in categories.iter().zip(&category_ids) {
        let member_ids: Vec<&String> = assignments
            .iter()
            .filter(|a| &a.category == category)
            .filter_map(|a| {
                items
                    .iter()
                    .position(|item| item == &a.item)
                    .map(|index| &item_ids[index])
            })
            .collect();
        scoring_entries.push(json!({
            "id": category_id,
            "scoring_algorithm": "AllOrNothing",
            "scoring_data": {"value": member_ids},
        }));
    }

    (
        json!({
            "categories": category_entries,
            "categories_order": category_ids,
            "distractors": distractors,
            "uncategorized": item_entries,
            "uncategorized_order": item_ids,
        }),
        json!({
            "value": scoring_entries,
            "score_method": "all_or_nothing",
        }),
    )
}

// ========== 辅助 ==========

/// 查静态表；题型集合是封闭的，查不到说明表和枚举脱节了
fn table_entry(
    table: &phf::Map<&'static str, &'static str>,
    key: &str,
    question_type: QuestionType,
) -> Result<&'static str, ConvertError> {
    table.get(key).copied().ok_or(ConvertError {
        question_type: question_type.as_str(),
        expected: "已登记的题型",
        actual: key.to_string(),
    })
}

/// 从题目 id 和槽位名派生稳定标识符
fn slot_id(question_id: Uuid, slot: &str) -> String {
    let name = format!("{}:{}", question_id, slot);
    Uuid::new_v5(&ID_NAMESPACE, name.as_bytes()).to_string()
}

/// HTML 转义后包一层段落标签
fn html_body(text: &str) -> String {
    format!("<p>{}</p>", html_escape(text))
}

fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn expected_shape(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::MultipleChoice => "MultipleChoice 载荷",
        QuestionType::TrueFalse => "TrueFalse 载荷",
        QuestionType::FillInBlank => "FillInBlank 载荷",
        QuestionType::Matching => "Matching 载荷",
        QuestionType::Categorization => "Categorization 载荷",
    }
}
