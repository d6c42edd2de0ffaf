/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时执行的批次数量（生成工作流的 worker 上限）
    pub max_concurrent_batches: usize,
    /// 同时处理的 Quiz 数量
    pub max_concurrent_quizzes: usize,
    /// LLM 传输层重试上限（超时/频率限制/5xx）
    pub max_generation_retries: u32,
    /// 解析失败的纠错重试上限（独立于传输层重试）
    pub max_corrections: u32,
    /// 指数退避的基础等待（毫秒）
    pub retry_base_delay_ms: u64,
    /// Quiz 定义 TOML 存放目录
    pub toml_folder: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    // --- Canvas API 配置 ---
    pub canvas_api_base_url: String,
    pub canvas_token: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_batches: 5,
            max_concurrent_quizzes: 3,
            max_generation_retries: 3,
            max_corrections: 3,
            retry_base_delay_ms: 1000,
            toml_folder: "quiz_toml".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            llm_temperature: 0.7,
            llm_max_tokens: 4096,
            canvas_api_base_url: "https://canvas.instructure.com".to_string(),
            canvas_token: String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_batches: std::env::var("MAX_CONCURRENT_BATCHES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_batches),
            max_concurrent_quizzes: std::env::var("MAX_CONCURRENT_QUIZZES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_quizzes),
            max_generation_retries: std::env::var("MAX_GENERATION_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_generation_retries),
            max_corrections: std::env::var("MAX_CORRECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_corrections),
            retry_base_delay_ms: std::env::var("RETRY_BASE_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_base_delay_ms),
            toml_folder: std::env::var("TOML_FOLDER").unwrap_or(default.toml_folder),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_temperature: std::env::var("LLM_TEMPERATURE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_temperature),
            llm_max_tokens: std::env::var("LLM_MAX_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_max_tokens),
            canvas_api_base_url: std::env::var("CANVAS_API_BASE_URL").unwrap_or(default.canvas_api_base_url),
            canvas_token: std::env::var("CANVAS_TOKEN").unwrap_or(default.canvas_token),
        }
    }
}
