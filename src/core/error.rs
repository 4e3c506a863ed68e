//! 同步引擎错误类型

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 同步过程中可能出现的错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("路径过长 (上限 {limit} 字节): {path}")]
    PathTooLong { path: String, limit: usize },

    #[error("无法读取元数据 {}: {source}", path.display())]
    StatFailed { path: PathBuf, source: io::Error },

    #[error("不支持的条目类型（既非普通文件也非目录）: {}", path.display())]
    UnsupportedEntryKind { path: PathBuf },

    #[error("文件名不是合法的 UTF-8: {}", path.display())]
    InvalidName { path: PathBuf },

    #[error("无法打开 {}: {source}", path.display())]
    OpenFailed { path: PathBuf, source: io::Error },

    #[error("读取失败 {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    #[error("复制失败 {}: {source}", path.display())]
    CopyFailed { path: PathBuf, source: io::Error },

    #[error("创建目录失败 {}: {source}", path.display())]
    DirCreateFailed { path: PathBuf, source: io::Error },

    #[error("恢复文件属性失败 {}: {source}", path.display())]
    AttributeRestoreFailed { path: PathBuf, source: io::Error },

    #[error("根目录不可用 {}: {reason}", path.display())]
    RootUnavailable { path: PathBuf, reason: String },

    #[error("无法启动工作任务 ({role}): {reason}")]
    WorkerSpawnFailed { role: String, reason: String },

    #[error("工作任务异常退出 ({role}): {reason}")]
    WorkerFailed { role: String, reason: String },

    #[error("通道通信失败: {0}")]
    ChannelFailed(&'static str),
}

/// 错误类别，用于汇总统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    PathTooLong,
    StatFailed,
    UnsupportedEntryKind,
    InvalidName,
    OpenFailed,
    ReadFailed,
    CopyFailed,
    DirCreateFailed,
    AttributeRestoreFailed,
    RootUnavailable,
    WorkerSpawnFailed,
    WorkerFailed,
    ChannelFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::PathTooLong { .. } => ErrorKind::PathTooLong,
            SyncError::StatFailed { .. } => ErrorKind::StatFailed,
            SyncError::UnsupportedEntryKind { .. } => ErrorKind::UnsupportedEntryKind,
            SyncError::InvalidName { .. } => ErrorKind::InvalidName,
            SyncError::OpenFailed { .. } => ErrorKind::OpenFailed,
            SyncError::ReadFailed { .. } => ErrorKind::ReadFailed,
            SyncError::CopyFailed { .. } => ErrorKind::CopyFailed,
            SyncError::DirCreateFailed { .. } => ErrorKind::DirCreateFailed,
            SyncError::AttributeRestoreFailed { .. } => ErrorKind::AttributeRestoreFailed,
            SyncError::RootUnavailable { .. } => ErrorKind::RootUnavailable,
            SyncError::WorkerSpawnFailed { .. } => ErrorKind::WorkerSpawnFailed,
            SyncError::WorkerFailed { .. } => ErrorKind::WorkerFailed,
            SyncError::ChannelFailed(_) => ErrorKind::ChannelFailed,
        }
    }

    /// 出错的路径（与具体路径无关的错误返回 `None`）
    pub fn path(&self) -> Option<&Path> {
        match self {
            SyncError::PathTooLong { path, .. } => Some(Path::new(path)),
            SyncError::StatFailed { path, .. }
            | SyncError::UnsupportedEntryKind { path }
            | SyncError::InvalidName { path }
            | SyncError::OpenFailed { path, .. }
            | SyncError::ReadFailed { path, .. }
            | SyncError::CopyFailed { path, .. }
            | SyncError::DirCreateFailed { path, .. }
            | SyncError::AttributeRestoreFailed { path, .. }
            | SyncError::RootUnavailable { path, .. } => Some(path),
            SyncError::WorkerSpawnFailed { .. }
            | SyncError::WorkerFailed { .. }
            | SyncError::ChannelFailed(_) => None,
        }
    }

    /// 是否为致命错误（应在任何复制之前终止本次运行）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RootUnavailable
                | ErrorKind::WorkerSpawnFailed
                | ErrorKind::WorkerFailed
                | ErrorKind::ChannelFailed
        )
    }
}
