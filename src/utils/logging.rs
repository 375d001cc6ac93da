/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::Config;

/// 初始化日志，默认 info 级别，可用 RUST_LOG 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 日志里使用的短 ID
pub fn short_id(id: &Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 游戏 QA 并发测试服务");
    info!("📊 最大并发数: {}", config.max_concurrent_tests);
    if config.max_pending_tests == 0 {
        info!("📥 等待队列: 不限");
    } else {
        info!("📥 等待队列上限: {}", config.max_pending_tests);
    }
    info!("📁 产物目录: {}", config.artifacts_dir);
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号
/// - `total_batches`: 批次总数
/// - `start`: 起始游戏编号
/// - `end`: 结束游戏编号
/// - `total`: 游戏总数
pub fn log_batch_start(batch_num: usize, total_batches: usize, start: usize, end: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 提交第 {}/{} 批", batch_num, total_batches);
    info!("🎮 本批游戏: {}-{} / 共 {} 个", start, end, total);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
pub fn log_batch_complete(batch_id: &Uuid, completed: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 批次 {} 完成: 成功 {}/{}",
        short_id(batch_id),
        completed,
        total
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(success: usize, failed: usize, total: usize, artifacts_dir: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部测试完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n报告已保存至: {}", artifacts_dir);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
