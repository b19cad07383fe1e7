/// 日志工具模块
///
/// 负责安装全局日志订阅器，并提供日志格式化和输出的辅助函数
use std::fs::{self, File};
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{Config, LoggingConfig};
use crate::error::{AppError, AppResult};
use crate::models::judgment::{RatingCounts, RelevanceRating};
use crate::services::exporter::percentage;

/// HTTP 相关依赖的日志过多，非 verbose 模式下只保留警告
const NOISY_TARGETS: [&str; 3] = ["hyper", "reqwest", "async_openai"];

/// 初始化全局日志
///
/// 控制台输出到 stderr，级别由配置决定（`RUST_LOG` 优先）；
/// 指定日志文件时额外写入一份 DEBUG 级别的日志。
pub fn init(config: &LoggingConfig) -> AppResult<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(config)));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_layer = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .map_err(|e| AppError::io(parent.display().to_string(), e))?;
            }
            let file = File::create(path).map_err(|e| AppError::io(path.display().to_string(), e))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new(file_directives())),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

fn console_directives(config: &LoggingConfig) -> String {
    if config.verbose {
        return "debug".to_string();
    }
    let mut directives = config.log_level.to_lowercase();
    for target in NOISY_TARGETS {
        directives.push_str(&format!(",{}=warn", target));
    }
    directives
}

fn file_directives() -> String {
    let mut directives = "debug".to_string();
    for target in NOISY_TARGETS {
        directives.push_str(&format!(",{}=warn", target));
    }
    directives
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 论文相关性分析启动");
    info!("📚 调研主题: {}", config.survey.topic);
    if !config.survey.description.trim().is_empty() {
        info!("📝 主题描述: {}", config.survey.description);
    }
    info!("📁 输入目录: {}", config.processing.input_dir.display());
    info!("📄 输出文件: {}", config.processing.output_file.display());
    info!("🤖 模型: {} @ {}", config.llm.model_name, config.llm.api_base_url);
    info!(
        "📊 每批 {} 篇，最大并发 {}，每篇最多尝试 {} 次",
        config.processing.batch_size,
        config.processing.max_concurrent_requests,
        config.llm.max_retries
    );
    info!("{}", "=".repeat(60));
}

/// 记录文件开始处理
pub fn log_file_start(filename: &str, paper_count: usize, total_batches: usize, start_batch: usize) {
    info!("\n{}", "=".repeat(60));
    if start_batch > 0 {
        info!(
            "[文件 {}] ▶️ 从第 {}/{} 批继续，共 {} 篇论文",
            filename,
            start_batch + 1,
            total_batches,
            paper_count
        );
    } else {
        info!(
            "[文件 {}] 📂 开始处理，共 {} 篇论文，{} 批",
            filename, paper_count, total_batches
        );
    }
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
pub fn log_batch_start(
    filename: &str,
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!(
        "[文件 {}] 📦 开始处理第 {}/{} 批 (论文 {}-{} / 共 {} 篇)",
        filename, batch_num, total_batches, start, end, total
    );
}

/// 记录批次完成信息
pub fn log_batch_complete(filename: &str, batch_num: usize, counts: &RatingCounts) {
    info!("{}", "─".repeat(60));
    info!(
        "[文件 {}] ✓ 第 {} 批完成: 成功 {}/{}",
        filename,
        batch_num,
        counts.total() - counts.unknown,
        counts.total()
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息（Unknown 只在非零时显示）
pub fn print_final_stats(counts: &RatingCounts, output_file: &str) {
    let total = counts.total();
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("论文总数: {}", total);
    for rating in RelevanceRating::ALL {
        let count = counts.get(rating);
        if rating == RelevanceRating::Unknown && count == 0 {
            continue;
        }
        info!("  {:<8} {:>6} ({})", rating, count, percentage(count, total));
    }
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", output_file);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        assert_eq!(truncate_text("论文标题很长", 2), "论文...");
    }

    #[test]
    fn test_console_directives() {
        let config = LoggingConfig {
            log_level: "INFO".to_string(),
            ..Default::default()
        };
        assert_eq!(
            console_directives(&config),
            "info,hyper=warn,reqwest=warn,async_openai=warn"
        );

        let verbose = LoggingConfig {
            verbose: true,
            ..config
        };
        assert_eq!(console_directives(&verbose), "debug");
    }
}
