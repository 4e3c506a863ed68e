//! 同步配置模块

use serde::Serialize;
use std::path::PathBuf;

/// 一次同步运行的配置（不持久化）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// 源目录
    pub source: String,
    /// 目标目录
    pub destination: String,
    /// 分析任务数（1 表示串行）
    pub workers: usize,
    /// 是否比较内容指纹（关闭时只比较大小和修改时间）
    pub use_fingerprint: bool,
    /// 是否允许并行构建清单
    pub parallel: bool,
    /// 演练模式：只报告将要执行的操作
    pub dry_run: bool,
    /// 详细输出
    pub verbose: bool,
    /// 日志文件（可选）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

fn default_workers() -> usize {
    1
}

impl SyncConfig {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            workers: default_workers(),
            use_fingerprint: true,
            parallel: true,
            dry_run: false,
            verbose: false,
            log_file: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_fingerprint(mut self, enabled: bool) -> Self {
        self.use_fingerprint = enabled;
        self
    }

    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// 是否使用并行模式（需要多于一个分析任务）
    pub fn is_parallel(&self) -> bool {
        self.parallel && self.workers > 1
    }
}
