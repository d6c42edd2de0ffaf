//! 从 TOML 文件加载 Quiz 定义
//!
//! 每个 TOML 文件描述一个待生成的 Quiz：标题、课程、选中的模块和批次需求。

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::models::question::{Difficulty, QuestionType};
use crate::models::quiz::{ModuleSelection, ModuleSource, QuestionBatch, Quiz, QuizLanguage};

/// TOML 里的 Quiz 定义
#[derive(Debug, Deserialize)]
pub struct QuizDefinition {
    pub title: String,
    pub canvas_course_id: u64,
    #[serde(default = "default_language")]
    pub language: QuizLanguage,
    #[serde(default)]
    pub llm_model: Option<String>,
    pub modules: Vec<ModuleDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct ModuleDefinition {
    pub id: String,
    pub name: String,
    pub source_type: ModuleSource,
    #[serde(default)]
    pub content: Option<String>,
    pub batches: Vec<BatchDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct BatchDefinition {
    pub question_type: QuestionType,
    pub difficulty: Difficulty,
    pub count: u32,
}

fn default_language() -> QuizLanguage {
    QuizLanguage::English
}

impl QuizDefinition {
    /// 转成 Quiz 聚合根
    pub fn into_quiz(self) -> Quiz {
        let mut modules = HashMap::new();
        for m in self.modules {
            modules.insert(
                m.id,
                ModuleSelection {
                    name: m.name,
                    source_type: m.source_type,
                    content: m.content,
                    question_batches: m
                        .batches
                        .into_iter()
                        .map(|b| QuestionBatch {
                            question_type: b.question_type,
                            difficulty: b.difficulty,
                            count: b.count,
                        })
                        .collect(),
                },
            );
        }
        let mut quiz = Quiz::new(self.title, self.canvas_course_id, modules, self.language);
        quiz.llm_model = self.llm_model;
        quiz
    }
}

/// 从 TOML 文件加载单个 Quiz 定义
pub async fn load_toml_to_quiz(toml_file_path: &Path) -> Result<Quiz> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let definition: QuizDefinition = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    Ok(definition.into_quiz())
}

/// 从文件夹加载全部 Quiz 定义
pub async fn load_all_toml_files(folder_path: &str) -> Result<Vec<Quiz>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut quizzes = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            tracing::info!(
                "正在加载: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );

            match load_toml_to_quiz(&path).await {
                Ok(quiz) => {
                    tracing::info!(
                        "成功加载 Quiz「{}」，目标题目数 {}",
                        quiz.title,
                        quiz.target_question_count
                    );
                    quizzes.push(quiz);
                }
                Err(e) => {
                    tracing::warn!("加载文件失败 {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(quizzes)
}
