//! 日志模块 - 控制台输出与可选的日志文件

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 默认日志级别: "error", "warn", "info", "debug", "trace"（`RUST_LOG` 优先）
    pub level: String,
    /// 额外写入的日志文件
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

impl LogConfig {
    pub fn new(verbose: bool, log_file: Option<PathBuf>) -> Self {
        Self {
            level: if verbose { "debug" } else { "info" }.to_string(),
            log_file,
        }
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.tracing_level().into())
            .from_env_lossy()
    }
}

/// 初始化日志系统
///
/// 控制台日志输出到 stderr；配置了日志文件时额外写入一个不带颜色的文件层。
/// 返回的 guard 必须在整个运行期间持有，否则缓冲中的日志会丢失。
/// 全局 subscriber 已存在时静默忽略。
pub fn init_logging(config: &LogConfig) -> io::Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    match &config.log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);

            let subscriber = tracing_subscriber::registry()
                .with(config.env_filter())
                .with(console_layer)
                .with(file_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
            Ok(Some(guard))
        }
        None => {
            let subscriber = tracing_subscriber::registry()
                .with(config.env_filter())
                .with(console_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
            Ok(None)
        }
    }
}

fn open_log_file(path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::OpenOptions::new().create(true).append(true).open(path)
}
