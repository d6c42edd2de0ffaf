//! Canvas LMS 客户端
//!
//! 用 reqwest 实现四个协作方接口：模块内容提取、New Quiz 建壳、
//! 逐题导出、回滚删除。HTML 清洗不是这里的职责，只做最基础的去标签。

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::clients::{ContentExtractor, ItemExportResult, ItemExporter, QuizCreator, QuizDeleter};
use crate::config::Config;
use crate::error::{AppError, AppResult, CriticalKind, RetryableKind};
use crate::models::quiz::ContentChunk;

/// Canvas 客户端
pub struct CanvasClient {
    http: reqwest::Client,
    base_url: String,
}

/// 模块条目（只关心 Page 类型）
#[derive(Debug, Deserialize)]
struct ModuleItem {
    #[serde(rename = "type")]
    item_type: String,
    page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageBody {
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedQuiz {
    id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CreatedItem {
    id: serde_json::Value,
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("固定正则"))
}

impl CanvasClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.canvas_api_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 把 reqwest 失败归类到错误分类学
    fn classify(err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            return AppError::retryable(RetryableKind::Timeout, "canvas", err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::classify_status(status, err.to_string());
        }
        // 连接失败等传输层故障按可重试处理
        AppError::retryable(RetryableKind::ServerError, "canvas", err.to_string())
    }

    fn classify_status(status: reqwest::StatusCode, message: String) -> AppError {
        if status.as_u16() == 429 {
            AppError::retryable(RetryableKind::RateLimited, "canvas", message)
        } else if status.is_server_error() {
            AppError::retryable(RetryableKind::ServerError, "canvas", message)
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            AppError::critical(CriticalKind::Auth, "canvas", message)
        } else {
            AppError::critical(CriticalKind::InvalidInput, "canvas", message)
        }
    }

    /// 非 2xx 响应转成分类错误
    async fn check(response: reqwest::Response) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::classify_status(
            status,
            format!("HTTP {}: {}", status, crate::logger::truncate_text(&body, 200)),
        ))
    }

    /// 提取单个模块的内容段
    async fn extract_module(
        &self,
        token: &str,
        course_id: u64,
        module_id: &str,
    ) -> AppResult<Vec<ContentChunk>> {
        let url = format!(
            "{}/api/v1/courses/{}/modules/{}/items",
            self.base_url, course_id, module_id
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("per_page", "50")])
            .send()
            .await
            .map_err(Self::classify)?;
        let items: Vec<ModuleItem> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::classify)?;

        let mut chunks = Vec::new();
        for item in items {
            if item.item_type != "Page" {
                continue;
            }
            let Some(page_url) = item.page_url else {
                continue;
            };
            let url = format!(
                "{}/api/v1/courses/{}/pages/{}",
                self.base_url, course_id, page_url
            );
            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(Self::classify)?;
            let page: PageBody = Self::check(response)
                .await?
                .json()
                .await
                .map_err(Self::classify)?;

            if let Some(body) = page.body {
                let text = tag_regex().replace_all(&body, " ");
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !text.is_empty() {
                    chunks.push(ContentChunk::new(text));
                }
            }
        }

        debug!("模块 {} 提取到 {} 段内容", module_id, chunks.len());
        Ok(chunks)
    }

    /// 外部系统返回的 id 可能是数字也可能是字符串
    fn id_to_string(id: serde_json::Value) -> String {
        match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

#[async_trait]
impl ContentExtractor for CanvasClient {
    async fn extract(
        &self,
        token: &str,
        course_id: u64,
        module_ids: &[String],
    ) -> AppResult<HashMap<String, Vec<ContentChunk>>> {
        let mut result = HashMap::new();
        for module_id in module_ids {
            let chunks = self.extract_module(token, course_id, module_id).await?;
            result.insert(module_id.clone(), chunks);
        }
        Ok(result)
    }
}

#[async_trait]
impl QuizCreator for CanvasClient {
    async fn create_quiz(
        &self,
        token: &str,
        course_id: u64,
        title: &str,
        total_points: u32,
    ) -> AppResult<String> {
        let url = format!(
            "{}/api/quiz/v1/courses/{}/quizzes",
            self.base_url, course_id
        );
        let body = serde_json::json!({
            "quiz": {
                "title": title,
                "points_possible": total_points,
                "published": false,
            }
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify)?;
        let created: CreatedQuiz = Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::classify)?;

        Ok(Self::id_to_string(created.id))
    }
}

#[async_trait]
impl ItemExporter for CanvasClient {
    async fn export_items(
        &self,
        token: &str,
        course_id: u64,
        canvas_quiz_id: &str,
        items: &[serde_json::Value],
    ) -> AppResult<Vec<ItemExportResult>> {
        let url = format!(
            "{}/api/quiz/v1/courses/{}/quizzes/{}/items",
            self.base_url, course_id, canvas_quiz_id
        );

        // Canvas 逐题提交；每题一个结果，顺序与输入一致
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let sent = self
                .http
                .post(&url)
                .bearer_auth(token)
                .json(item)
                .send()
                .await;

            let result = match sent {
                Ok(response) => match Self::check(response).await {
                    Ok(response) => match response.json::<CreatedItem>().await {
                        Ok(created) => ItemExportResult::ok(Self::id_to_string(created.id)),
                        Err(e) => ItemExportResult::failed(e.to_string()),
                    },
                    Err(e) => ItemExportResult::failed(e.to_string()),
                },
                Err(e) => ItemExportResult::failed(e.to_string()),
            };
            results.push(result);
        }

        Ok(results)
    }
}

#[async_trait]
impl QuizDeleter for CanvasClient {
    async fn delete_quiz(
        &self,
        token: &str,
        course_id: u64,
        canvas_quiz_id: &str,
    ) -> AppResult<bool> {
        let url = format!(
            "{}/api/quiz/v1/courses/{}/quizzes/{}",
            self.base_url, course_id, canvas_quiz_id
        );
        let response = self
            .http
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if status.is_success() {
            Ok(true)
        } else {
            warn!("删除外部 Quiz {} 失败: HTTP {}", canvas_quiz_id, status);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(CanvasClient::classify_status(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "429".to_string()
        )
        .is_retryable());
        assert!(CanvasClient::classify_status(
            reqwest::StatusCode::BAD_GATEWAY,
            "502".to_string()
        )
        .is_retryable());
        assert!(!CanvasClient::classify_status(
            reqwest::StatusCode::UNAUTHORIZED,
            "401".to_string()
        )
        .is_retryable());
        assert!(!CanvasClient::classify_status(
            reqwest::StatusCode::UNPROCESSABLE_ENTITY,
            "422".to_string()
        )
        .is_retryable());
    }

    #[test]
    fn test_id_to_string() {
        assert_eq!(
            CanvasClient::id_to_string(serde_json::json!("abc")),
            "abc"
        );
        assert_eq!(CanvasClient::id_to_string(serde_json::json!(42)), "42");
    }

    #[test]
    fn test_tag_stripping() {
        let html = "<p>光合作用发生在<strong>叶绿体</strong>中。</p>";
        let text = tag_regex().replace_all(html, " ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(text, "光合作用发生在 叶绿体 中。");
    }
}
