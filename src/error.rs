use std::fmt;

use crate::models::status::QuizStatus;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 外部系统错误（LLM / Canvas），分为可重试和不可重试
    External(ExternalError),
    /// LLM 输出解析错误（触发纠错子循环，与传输重试是两个独立计数器）
    Parse(ParseError),
    /// 生成内容结构校验错误
    Validation(ValidationError),
    /// 非法状态迁移（在产生任何副作用之前被拒绝）
    Transition(StateTransitionError),
    /// 存储层错误
    Store(StoreError),
    /// 格式转换错误
    Convert(ConvertError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::External(e) => write!(f, "外部系统错误: {}", e),
            AppError::Parse(e) => write!(f, "解析错误: {}", e),
            AppError::Validation(e) => write!(f, "校验错误: {}", e),
            AppError::Transition(e) => write!(f, "状态迁移错误: {}", e),
            AppError::Store(e) => write!(f, "存储错误: {}", e),
            AppError::Convert(e) => write!(f, "转换错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::External(e) => Some(e),
            AppError::Parse(e) => Some(e),
            AppError::Validation(e) => Some(e),
            AppError::Transition(e) => Some(e),
            AppError::Store(e) => Some(e),
            AppError::Convert(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 可重试错误的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableKind {
    /// 超时
    Timeout,
    /// 频率限制（429）
    RateLimited,
    /// 服务端错误（5xx）
    ServerError,
}

impl fmt::Display for RetryableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetryableKind::Timeout => "超时",
            RetryableKind::RateLimited => "频率限制",
            RetryableKind::ServerError => "服务端错误",
        };
        write!(f, "{}", s)
    }
}

/// 不可重试错误的种类（立即放弃当前批次，不影响其他批次）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticalKind {
    /// 认证失败（401/403）
    Auth,
    /// 配额用尽
    QuotaExceeded,
    /// 模型不存在
    ModelNotFound,
    /// 上下文超长
    ContextLengthExceeded,
    /// 请求本身非法（400）
    InvalidInput,
}

impl fmt::Display for CriticalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CriticalKind::Auth => "认证失败",
            CriticalKind::QuotaExceeded => "配额用尽",
            CriticalKind::ModelNotFound => "模型不存在",
            CriticalKind::ContextLengthExceeded => "上下文超长",
            CriticalKind::InvalidInput => "非法请求",
        };
        write!(f, "{}", s)
    }
}

/// 外部系统错误
#[derive(Debug)]
pub enum ExternalError {
    /// 瞬时故障：带退避重试，最多重试固定次数
    Retryable {
        kind: RetryableKind,
        service: String,
        message: String,
    },
    /// 严重故障：不重试，立即中止当前工作单元
    Critical {
        kind: CriticalKind,
        service: String,
        message: String,
    },
}

impl ExternalError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExternalError::Retryable { .. })
    }
}

impl fmt::Display for ExternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalError::Retryable {
                kind,
                service,
                message,
            } => write!(f, "{} ({}): {}", kind, service, message),
            ExternalError::Critical {
                kind,
                service,
                message,
            } => write!(f, "{} ({}): {}", kind, service, message),
        }
    }
}

impl std::error::Error for ExternalError {}

/// LLM 输出解析错误
#[derive(Debug)]
pub enum ParseError {
    /// 响应为空
    EmptyResponse,
    /// 文本里找不到 JSON（没有 `{` / `[`）
    NoJsonFound { preview: String },
    /// JSON 解码失败
    DecodeFailed { message: String, preview: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::EmptyResponse => write!(f, "LLM 响应为空"),
            ParseError::NoJsonFound { preview } => {
                write!(f, "响应中找不到 JSON: {}", preview)
            }
            ParseError::DecodeFailed { message, preview } => {
                write!(f, "JSON 解码失败 ({}): {}", message, preview)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// 结构校验错误
#[derive(Debug)]
pub enum ValidationError {
    /// 必填字段缺失或为空
    MissingField {
        question_type: &'static str,
        field: &'static str,
    },
    /// 字段超出长度限制
    FieldTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
    /// 选择题正确答案不在 A-D 之内
    InvalidCorrectAnswer { got: String },
    /// 条目数量不足
    TooFewItems {
        question_type: &'static str,
        min: usize,
        actual: usize,
    },
    /// 匹配题答案重复（大小写不敏感比较）
    DuplicateAnswer { answer: String },
    /// 干扰项与正确答案冲突
    DistractorCollision { distractor: String },
    /// 分类题条目没有归属
    UnassignedItem { item: String },
    /// 分类题条目被归属两次
    DoubleAssignedItem { item: String },
    /// 分类题条目引用了不存在的分类
    UnknownCategory { item: String, category: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField {
                question_type,
                field,
            } => write!(f, "{} 缺少必填字段: {}", question_type, field),
            ValidationError::FieldTooLong { field, max, actual } => {
                write!(f, "字段 {} 超长: {} > {}", field, actual, max)
            }
            ValidationError::InvalidCorrectAnswer { got } => {
                write!(f, "正确答案必须是 A/B/C/D，实际为: {}", got)
            }
            ValidationError::TooFewItems {
                question_type,
                min,
                actual,
            } => write!(
                f,
                "{} 条目不足: 至少 {} 个，实际 {} 个",
                question_type, min, actual
            ),
            ValidationError::DuplicateAnswer { answer } => {
                write!(f, "答案重复: {}", answer)
            }
            ValidationError::DistractorCollision { distractor } => {
                write!(f, "干扰项与正确答案冲突: {}", distractor)
            }
            ValidationError::UnassignedItem { item } => {
                write!(f, "条目没有归属到任何分类: {}", item)
            }
            ValidationError::DoubleAssignedItem { item } => {
                write!(f, "条目被归属到多个分类: {}", item)
            }
            ValidationError::UnknownCategory { item, category } => {
                write!(f, "条目 {} 引用了不存在的分类: {}", item, category)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// 非法状态迁移
#[derive(Debug)]
pub struct StateTransitionError {
    pub from: QuizStatus,
    pub to: QuizStatus,
}

impl fmt::Display for StateTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "不允许的状态迁移: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for StateTransitionError {}

/// 存储层错误
#[derive(Debug)]
pub enum StoreError {
    /// Quiz 不存在
    QuizNotFound { quiz_id: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::QuizNotFound { quiz_id } => write!(f, "Quiz 不存在: {}", quiz_id),
        }
    }
}

impl std::error::Error for StoreError {}

/// 格式转换错误：报告期望的载荷形状和实际拿到的形状，从不静默纠正
#[derive(Debug, thiserror::Error)]
#[error("格式转换失败 ({question_type}): 期望 {expected}，实际 {actual}")]
pub struct ConvertError {
    pub question_type: &'static str,
    pub expected: &'static str,
    pub actual: String,
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建可重试的外部错误
    pub fn retryable(
        kind: RetryableKind,
        service: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        AppError::External(ExternalError::Retryable {
            kind,
            service: service.into(),
            message: message.into(),
        })
    }

    /// 创建不可重试的外部错误
    pub fn critical(
        kind: CriticalKind,
        service: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        AppError::External(ExternalError::Critical {
            kind,
            service: service.into(),
            message: message.into(),
        })
    }

    /// 创建状态迁移错误
    pub fn transition(from: QuizStatus, to: QuizStatus) -> Self {
        AppError::Transition(StateTransitionError { from, to })
    }

    /// 创建 Quiz 不存在错误
    pub fn quiz_not_found(quiz_id: impl Into<String>) -> Self {
        AppError::Store(StoreError::QuizNotFound {
            quiz_id: quiz_id.into(),
        })
    }

    /// 是否是可重试的外部错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::External(e) if e.is_retryable())
    }
}

// ========== 从常见错误类型转换 ==========

impl From<ExternalError> for AppError {
    fn from(err: ExternalError) -> Self {
        AppError::External(err)
    }
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        AppError::Parse(err)
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<ConvertError> for AppError {
    fn from(err: ConvertError) -> Self {
        AppError::Convert(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<tokio::sync::AcquireError> for AppError {
    fn from(err: tokio::sync::AcquireError) -> Self {
        AppError::Other(format!("Semaphore 已关闭: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(ParseError::DecodeFailed {
            message: err.to_string(),
            preview: String::new(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let err = AppError::retryable(RetryableKind::RateLimited, "llm", "429");
        assert!(err.is_retryable());

        let err = AppError::critical(CriticalKind::Auth, "llm", "401");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transition_error_display() {
        let err = AppError::transition(
            QuizStatus::ReadyForReviewPartial,
            QuizStatus::ExportingToCanvas,
        );
        let text = err.to_string();
        assert!(text.contains("ready_for_review_partial"));
        assert!(text.contains("exporting_to_canvas"));
    }

    #[test]
    fn test_convert_error_names_shapes() {
        let err = ConvertError {
            question_type: "multiple_choice",
            expected: "MultipleChoice 载荷",
            actual: "TrueFalse".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("MultipleChoice"));
        assert!(text.contains("TrueFalse"));
    }
}
