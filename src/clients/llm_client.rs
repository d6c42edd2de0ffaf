//! LLM 客户端
//!
//! 基于 `async-openai`，兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）。
//! 职责：
//! - 把 `ChatMessage` 列表转成 API 请求并取回原始文本
//! - 把失败分类为可重试/严重（重试循环在调用方，见 `with_backoff`）
//! - 不关心 prompt 内容，不关心批次

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clients::{ChatMessage, ChatRole, LlmOverrides, LlmProvider};
use crate::config::Config;
use crate::error::{AppError, AppResult, CriticalKind, ParseError, RetryableKind};

/// LLM 客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        }
    }

    /// 把失败归类到错误分类学
    ///
    /// 只有超时/频率限制/5xx 算可重试；认证、配额、模型不存在、
    /// 上下文超长都是严重错误，立即中止当前批次。
    fn classify(&self, err: &OpenAIError) -> AppError {
        let message = err.to_string();
        let lower = message.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return AppError::retryable(RetryableKind::Timeout, "llm", message);
        }
        if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("too many requests")
        {
            return AppError::retryable(RetryableKind::RateLimited, "llm", message);
        }
        if lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
            || lower.contains("overloaded")
            || lower.contains("internal server error")
        {
            return AppError::retryable(RetryableKind::ServerError, "llm", message);
        }
        if lower.contains("401")
            || lower.contains("403")
            || lower.contains("api key")
            || lower.contains("unauthorized")
            || lower.contains("authentication")
        {
            return AppError::critical(CriticalKind::Auth, "llm", message);
        }
        if lower.contains("quota") || lower.contains("insufficient") {
            return AppError::critical(CriticalKind::QuotaExceeded, "llm", message);
        }
        if lower.contains("model")
            && (lower.contains("not found")
                || lower.contains("does not exist")
                || lower.contains("not exist"))
        {
            return AppError::critical(CriticalKind::ModelNotFound, "llm", message);
        }
        if lower.contains("context length")
            || lower.contains("maximum context")
            || lower.contains("token limit")
        {
            return AppError::critical(CriticalKind::ContextLengthExceeded, "llm", message);
        }

        AppError::critical(CriticalKind::InvalidInput, "llm", message)
    }

    async fn request(
        &self,
        messages: &[ChatMessage],
        model_name: &str,
        temperature: f32,
    ) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", model_name);

        // 构建消息列表
        let mut request_messages = Vec::with_capacity(messages.len());
        for message in messages {
            let built = match message.role {
                ChatRole::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(message.content.as_str())
                        .build()
                        .map_err(|e| AppError::Other(e.to_string()))?,
                ),
                ChatRole::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(message.content.as_str())
                        .build()
                        .map_err(|e| AppError::Other(e.to_string()))?,
                ),
            };
            request_messages.push(built);
        }

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(model_name)
            .messages(request_messages)
            .temperature(temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| AppError::Other(e.to_string()))?;

        // 调用 API
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            self.classify(&e)
        })?;

        debug!("LLM API 调用成功");

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(AppError::Parse(ParseError::EmptyResponse))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    async fn generate(&self, messages: &[ChatMessage]) -> AppResult<String> {
        self.request(messages, &self.model_name, self.temperature)
            .await
    }

    /// Quiz 定义里的 llm_model / llm_temperature 从这里覆盖默认值
    async fn generate_with(
        &self,
        messages: &[ChatMessage],
        overrides: &LlmOverrides,
    ) -> AppResult<String> {
        let model_name = overrides.model.as_deref().unwrap_or(&self.model_name);
        let temperature = overrides.temperature.unwrap_or(self.temperature);
        self.request(messages, model_name, temperature).await
    }
}
