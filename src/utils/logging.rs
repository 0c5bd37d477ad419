//! 日志工具模块
//!
//! 初始化 tracing 订阅器，并提供运行过程中的格式化输出辅助函数

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// 运行日志文件名
pub const LOG_FILE_NAME: &str = "paper_digest.log";

/// 初始化日志：stderr + `<log_dir>/paper_digest.log`
///
/// 日志级别由 `RUST_LOG` 控制，默认 `info`。返回日志文件路径。
pub fn init(log_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("无法创建日志目录: {}", log_dir.display()))?;

    let log_file_path = log_dir.join(LOG_FILE_NAME);
    init_log_file(&log_file_path)?;
    let file = OpenOptions::new()
        .append(true)
        .open(&log_file_path)
        .with_context(|| format!("无法打开日志文件: {}", log_file_path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("日志系统已初始化")?;

    Ok(log_file_path)
}

/// 写入日志文件头
pub fn init_log_file(log_file_path: &Path) -> Result<()> {
    let log_header = format!(
        "{}\n论文摘要运行日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(topic: &str, papers_requested: usize, max_concurrency: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 论文摘要流水线");
    info!("🔍 主题: {}", topic);
    info!("📄 请求论文数: {}", papers_requested);
    info!("📊 最大并发数: {}", max_concurrency);
    info!("{}", "=".repeat(60));
}

/// 记录论文检索结果
pub fn log_papers_fetched(total: usize, max_concurrency: usize) {
    info!("✓ 检索到 {} 篇论文", total);
    info!("📋 最多同时处理 {} 篇\n", max_concurrency);
}

/// 打印最终统计信息
pub fn print_final_stats(included: usize, failed: usize, requested: usize, report_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 收录: {}/{}", included, requested);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n报告已保存至: {}", report_path);
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
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("图神经网络", 2), "图神...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn test_log_file_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        init_log_file(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(&"=".repeat(60)));
        assert!(content.contains("论文摘要运行日志"));
    }
}
