use anyhow::Result;
use std::sync::Arc;

use quiz_pipeline::clients::{CanvasClient, LlmClient};
use quiz_pipeline::models::load_all_toml_files;
use quiz_pipeline::store::QuizStore;
use quiz_pipeline::{logger, Config, InMemoryQuizStore, QuizPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init();

    // 加载配置
    let config = Config::from_env();
    logger::log_startup(config.max_concurrent_quizzes, config.max_concurrent_batches);

    // 从 TOML 目录加载 Quiz 定义
    let quizzes = load_all_toml_files(&config.toml_folder).await?;
    let total = quizzes.len();
    logger::log_quizzes_loaded(total, config.max_concurrent_quizzes);

    // 建 store 并登记所有 Quiz
    let store: Arc<InMemoryQuizStore> = Arc::new(InMemoryQuizStore::new());
    let mut quiz_ids = Vec::with_capacity(total);
    for quiz in quizzes {
        quiz_ids.push(quiz.id);
        store.insert_quiz(quiz).await?;
    }

    // 组装流水线
    let llm = Arc::new(LlmClient::new(&config));
    let canvas = Arc::new(CanvasClient::new(&config));
    let token = config.canvas_token.clone();
    let pipeline = Arc::new(QuizPipeline::new(
        store,
        llm,
        canvas.clone(),
        canvas.clone(),
        canvas.clone(),
        canvas,
        config,
    ));

    // 并发处理全部 Quiz（提取 + 生成；导出在审核之后单独触发）
    let (success, failed) = pipeline.run_all(quiz_ids, &token).await;
    logger::print_final_stats(success, failed, total);

    Ok(())
}
