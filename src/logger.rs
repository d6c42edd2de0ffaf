//! 日志工具模块
//!
//! 提供 tracing 初始化和日志格式化的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 日志
///
/// 默认 INFO 级别，可以用 `RUST_LOG` 环境变量覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(max_concurrent_quizzes: usize, max_concurrent_batches: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - Quiz 流水线模式");
    info!("📊 Quiz 并发数: {}", max_concurrent_quizzes);
    info!("📦 批次并发数: {}", max_concurrent_batches);
    info!("{}", "=".repeat(60));
}

/// 记录 Quiz 加载信息
pub fn log_quizzes_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 个待处理的 Quiz", total);
    info!("📋 将以最多 {} 个并发的方式处理\n", max_concurrent);
}

/// 打印最终统计信息
pub fn print_final_stats(success: usize, failed: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("abcdefghij", 5), "abcde...");
    }
}
