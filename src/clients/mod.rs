//! 外部协作方
//!
//! 核心编排只依赖这里的窄接口：LLM 提供方和 Canvas 的四个操作
//! （内容提取 / 建壳 / 逐题导出 / 回滚删除）。
//! 真实实现是 `LlmClient`（async-openai）和 `CanvasClient`（reqwest），
//! 测试里换成内存 mock。

pub mod canvas_client;
pub mod llm_client;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::AppResult;
use crate::models::quiz::ContentChunk;

pub use canvas_client::CanvasClient;
pub use llm_client::LlmClient;

/// 对话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
}

/// 一条发给 LLM 的消息
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Quiz 级的模型参数覆盖
///
/// 字段为 `None` 时用客户端自身的默认值。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmOverrides {
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// LLM 提供方
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// 发送消息，返回原始文本。失败按可重试/严重分类（见 error.rs）。
    async fn generate(&self, messages: &[ChatMessage]) -> AppResult<String>;

    /// 带 Quiz 级参数覆盖的生成；不区分模型的实现可以忽略覆盖
    async fn generate_with(
        &self,
        messages: &[ChatMessage],
        overrides: &LlmOverrides,
    ) -> AppResult<String> {
        let _ = overrides;
        self.generate(messages).await
    }
}

/// 课程内容提取
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// 按模块提取内容，key 是模块 ID。网络故障归为可重试错误。
    async fn extract(
        &self,
        token: &str,
        course_id: u64,
        module_ids: &[String],
    ) -> AppResult<HashMap<String, Vec<ContentChunk>>>;
}

/// 创建外部 Quiz 壳
#[async_trait]
pub trait QuizCreator: Send + Sync {
    /// 返回外部系统生成的 Quiz ID
    async fn create_quiz(
        &self,
        token: &str,
        course_id: u64,
        title: &str,
        total_points: u32,
    ) -> AppResult<String>;
}

/// 单道题的导出结果
#[derive(Debug, Clone)]
pub struct ItemExportResult {
    pub success: bool,
    pub external_item_id: Option<String>,
    pub error: Option<String>,
}

impl ItemExportResult {
    pub fn ok(external_item_id: impl Into<String>) -> Self {
        Self {
            success: true,
            external_item_id: Some(external_item_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_item_id: None,
            error: Some(error.into()),
        }
    }
}

/// 逐题导出
#[async_trait]
pub trait ItemExporter: Send + Sync {
    /// 输入输出一一对应、顺序一致
    async fn export_items(
        &self,
        token: &str,
        course_id: u64,
        canvas_quiz_id: &str,
        items: &[serde_json::Value],
    ) -> AppResult<Vec<ItemExportResult>>;
}

/// 删除外部 Quiz（只用于回滚）
#[async_trait]
pub trait QuizDeleter: Send + Sync {
    async fn delete_quiz(
        &self,
        token: &str,
        course_id: u64,
        canvas_quiz_id: &str,
    ) -> AppResult<bool>;
}

/// 带指数退避的有界重试
///
/// 只重试分类为可重试的错误（超时/频率限制/5xx）；
/// 严重错误直接透传，由调用方决定中止范围。
pub async fn with_backoff<T, Fut>(
    service: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut op: impl FnMut() -> Fut,
) -> AppResult<T>
where
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = base_delay * 2u32.saturating_pow(attempt - 1);
                warn!(
                    "⚠️ {} 调用失败（第 {}/{} 次）: {}，{}ms 后重试",
                    service,
                    attempt,
                    max_attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
