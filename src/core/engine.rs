//! 同步编排 - 检查根目录、构建两棵树的清单、比较并执行复制

use crate::config::SyncConfig;
use crate::core::comparator::{FileComparator, SyncAction};
use crate::core::error::{ErrorKind, SyncError};
use crate::core::probe::{directory_exists, is_directory_writable};
use crate::core::scanner::{scan_tree, ScanOutcome};
use crate::core::transfer::{CopyOutcome, SyncExecutor};
use crate::core::workers::scan_parallel;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// 清单构建方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Serial,
    Parallel,
}

/// 单个失败条目
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub path: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl FailureRecord {
    fn new(error: &SyncError, relative: Option<&str>) -> Self {
        let path = relative
            .map(str::to_string)
            .or_else(|| error.path().map(|p| p.display().to_string()));
        Self {
            path,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// 耗时（毫秒）
    pub duration: u64,
    pub mode: ScanMode,
    pub dry_run: bool,
    pub source_entries: usize,
    pub destination_entries: usize,
    pub files_copied: usize,
    pub dirs_created: usize,
    /// 需要同步但目标中已存在的目录
    pub dirs_existing: usize,
    pub skipped: usize,
    /// 演练模式下将会复制或创建的条目数
    pub would_copy: usize,
    pub failed: usize,
    pub bytes_copied: u64,
    pub failures: Vec<FailureRecord>,
}

impl SyncReport {
    fn new(mode: ScanMode, dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            end_time: now,
            duration: 0,
            mode,
            dry_run,
            source_entries: 0,
            destination_entries: 0,
            files_copied: 0,
            dirs_created: 0,
            dirs_existing: 0,
            skipped: 0,
            would_copy: 0,
            failed: 0,
            bytes_copied: 0,
            failures: Vec::new(),
        }
    }

    /// 实际修改目标树的次数
    pub fn mutations(&self) -> usize {
        self.files_copied + self.dirs_created
    }

    fn record_failure(&mut self, error: &SyncError, relative: Option<&str>) {
        self.failed += 1;
        self.failures.push(FailureRecord::new(error, relative));
    }

    fn record_outcome(&mut self, outcome: CopyOutcome) {
        match outcome {
            CopyOutcome::Copied { bytes } => {
                self.files_copied += 1;
                self.bytes_copied += bytes;
            }
            CopyOutcome::DirCreated => self.dirs_created += 1,
            CopyOutcome::DirExisted => self.dirs_existing += 1,
            CopyOutcome::WouldCopy { .. } | CopyOutcome::WouldCreateDir => self.would_copy += 1,
        }
    }
}

/// 同步引擎
pub struct SyncEngine {
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn mode(&self) -> ScanMode {
        if self.config.is_parallel() {
            ScanMode::Parallel
        } else {
            ScanMode::Serial
        }
    }

    /// 检查根目录：源目录必须存在，目标目录必须存在且（非演练模式下）可写
    pub fn check_roots(&self) -> Result<(), SyncError> {
        let source = Path::new(&self.config.source);
        if !directory_exists(source) {
            return Err(SyncError::RootUnavailable {
                path: source.to_path_buf(),
                reason: "源目录不存在或无法打开".to_string(),
            });
        }

        let destination = Path::new(&self.config.destination);
        if !directory_exists(destination) {
            return Err(SyncError::RootUnavailable {
                path: destination.to_path_buf(),
                reason: "目标目录不存在或无法打开".to_string(),
            });
        }
        if !self.config.dry_run && !is_directory_writable(destination) {
            return Err(SyncError::RootUnavailable {
                path: destination.to_path_buf(),
                reason: "目标目录不可写".to_string(),
            });
        }

        debug!("根目录检查通过");
        Ok(())
    }

    /// 构建源树与目标树的清单
    pub async fn build_inventories(&self) -> Result<(ScanOutcome, ScanOutcome), SyncError> {
        let config = &self.config;
        match self.mode() {
            ScanMode::Parallel => {
                scan_parallel(
                    &config.source,
                    &config.destination,
                    config.workers,
                    config.use_fingerprint,
                )
                .await
            }
            ScanMode::Serial => {
                let source = scan_tree(&config.source, config.use_fingerprint);
                let destination = scan_tree(&config.destination, config.use_fingerprint);
                Ok((source, destination))
            }
        }
    }

    /// 执行一次同步
    ///
    /// 根目录不可用或任务池无法建立时返回错误，此时不会做任何复制；
    /// 单个条目的失败只记录在报告中。
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let mut report = SyncReport::new(self.mode(), self.config.dry_run);

        info!(
            "开始同步: {} -> {} ({:?}, 指纹: {}, 演练: {})",
            self.config.source,
            self.config.destination,
            report.mode,
            self.config.use_fingerprint,
            self.config.dry_run
        );

        self.check_roots()?;
        let (source, destination) = self.build_inventories().await?;

        for failure in source.failures.iter().chain(destination.failures.iter()) {
            report.record_failure(failure, None);
        }
        report.source_entries = source.inventory.len();
        report.destination_entries = destination.inventory.len();

        let comparator = FileComparator::new(self.config.use_fingerprint);
        let executor = SyncExecutor::new(self.config.destination.as_str(), self.config.dry_run);
        let actions = comparator.compare_trees(&source.inventory, &destination.inventory);

        for (entry, action) in source.inventory.iter().zip(actions) {
            match action {
                SyncAction::Skip { .. } => report.skipped += 1,
                SyncAction::Copy { path, reason } => {
                    debug!("需要同步: {} ({:?})", path, reason);
                    match executor.apply_copy(entry) {
                        Ok(outcome) => report.record_outcome(outcome),
                        Err(e) => {
                            warn!("同步失败 [{}] {}: {}", e.kind(), path, e);
                            report.record_failure(&e, Some(&path));
                        }
                    }
                }
            }
        }

        report.end_time = Utc::now();
        report.duration = started.elapsed().as_millis() as u64;

        info!(
            "同步完成: 复制 {} 个文件, 创建 {} 个目录, 已有目录 {}, 跳过 {}, 演练 {}, 失败 {}, {} 字节, 耗时 {}ms",
            report.files_copied,
            report.dirs_created,
            report.dirs_existing,
            report.skipped,
            report.would_copy,
            report.failed,
            report.bytes_copied,
            report.duration
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn roots() -> (tempfile::TempDir, tempfile::TempDir) {
        (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap())
    }

    fn config_for(source: &Path, dest: &Path) -> SyncConfig {
        SyncConfig::new(source.to_str().unwrap(), dest.to_str().unwrap())
    }

    #[tokio::test]
    async fn missing_source_is_fatal() {
        let (source, dest) = roots();
        let engine = SyncEngine::new(config_for(&source.path().join("nope"), dest.path()));
        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, SyncError::RootUnavailable { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn missing_destination_is_fatal_even_in_dry_run() {
        let (source, dest) = roots();
        let config = config_for(source.path(), &dest.path().join("nope")).with_dry_run(true);
        let err = SyncEngine::new(config).run().await.unwrap_err();
        assert!(matches!(err, SyncError::RootUnavailable { .. }));
    }

    #[tokio::test]
    async fn serial_run_copies_and_counts() {
        let (source, dest) = roots();
        fs::write(source.path().join("a.txt"), b"0123456789").unwrap();
        fs::create_dir(source.path().join("sub")).unwrap();
        fs::write(source.path().join("sub/b.txt"), b"b").unwrap();

        let report = SyncEngine::new(config_for(source.path(), dest.path()))
            .run()
            .await
            .unwrap();

        assert_eq!(report.mode, ScanMode::Serial);
        assert_eq!(report.source_entries, 3);
        assert_eq!(report.destination_entries, 0);
        assert_eq!(report.files_copied, 2);
        assert_eq!(report.dirs_created, 1);
        assert_eq!(report.bytes_copied, 11);
        assert_eq!(report.failed, 0);
        assert_eq!(fs::read(dest.path().join("sub/b.txt")).unwrap(), b"b");
    }

    #[tokio::test]
    async fn report_serializes_camel_case() {
        let (source, dest) = roots();
        let report = SyncEngine::new(config_for(source.path(), dest.path()))
            .run()
            .await
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "serial");
        assert_eq!(json["filesCopied"], 0);
        assert!(json.get("wouldCopy").is_some());
        assert_eq!(json["dirsExisting"], 0);
        assert!(json["failures"].as_array().unwrap().is_empty());
    }

    #[test]
    fn existing_directory_is_counted_apart_from_skips() {
        let mut report = SyncReport::new(ScanMode::Serial, false);
        report.record_outcome(CopyOutcome::DirExisted);
        report.record_outcome(CopyOutcome::DirCreated);
        assert_eq!(report.dirs_existing, 1);
        assert_eq!(report.dirs_created, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.mutations(), 1);
    }
}
