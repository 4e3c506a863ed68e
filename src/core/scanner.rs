//! 目录树遍历 - 枚举相对路径并构建清单（串行模式）

use crate::core::error::SyncError;
use crate::core::inventory::FileInventory;
use crate::core::path::SEPARATOR;
use crate::core::probe::probe;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 目录树遍历器
///
/// 深度优先，按目录读取顺序产出文件与目录的相对路径（不含根目录本身）。
/// 该顺序不保证跨平台一致，依赖字典序的调用方必须自行排序。
pub struct TreeWalker {
    root: PathBuf,
}

impl TreeWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 遍历目录树，不跟随符号链接
    pub fn walk(&self) -> impl Iterator<Item = Result<String, SyncError>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .min_depth(1)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => self.relative_name(entry.path()),
                Err(e) => Some(Err(walk_error(&self.root, e))),
            })
    }

    /// 非 UTF-8 的名字作为错误产出，由调用方计入失败
    fn relative_name(&self, path: &Path) -> Option<Result<String, SyncError>> {
        let relative = path.strip_prefix(&self.root).ok()?;
        match relative.to_str() {
            Some(name) if !name.is_empty() => Some(Ok(normalize_separators(name))),
            Some(_) => None,
            None => Some(Err(SyncError::InvalidName {
                path: path.to_path_buf(),
            })),
        }
    }
}

/// 一棵目录树的构建结果
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub inventory: FileInventory,
    /// 枚举或探测失败的条目（已从清单中移除）
    pub failures: Vec<SyncError>,
}

/// 串行构建清单：遍历、尾部追加、显式排序，然后逐个探测
pub fn scan_tree(root: &str, use_fingerprint: bool) -> ScanOutcome {
    info!("开始扫描: {}", root);

    let mut inventory = FileInventory::new(root);
    let mut failures = Vec::new();

    for item in TreeWalker::new(root).walk() {
        let pushed = item.and_then(|relative| inventory.push_back(&relative).map(|_| ()));
        if let Err(e) = pushed {
            warn!("枚举失败 [{}]: {}", e.kind(), e);
            failures.push(e);
        }
    }

    inventory.sort_by_path();
    debug!("枚举完成: {} 个条目", inventory.len());

    let mut unreadable = Vec::new();
    for entry in inventory.iter_mut() {
        match probe(entry.full_path(), use_fingerprint) {
            Ok(attrs) => entry.set_attributes(attrs),
            Err(e) => {
                warn!("探测失败 [{}] {}: {}", e.kind(), entry.relative_path(), e);
                unreadable.push(entry.relative_path().to_string());
                failures.push(e);
            }
        }
    }
    for relative in &unreadable {
        inventory.remove(relative);
    }

    info!(
        "扫描完成: {}, {} 个条目, {} 个失败",
        root,
        inventory.len(),
        failures.len()
    );

    ScanOutcome {
        inventory,
        failures,
    }
}

/// 统一使用 `/` 作为分隔符
fn normalize_separators(name: &str) -> String {
    if std::path::MAIN_SEPARATOR == SEPARATOR {
        name.to_string()
    } else {
        name.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> SyncError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "目录遍历出现循环"));
    SyncError::StatFailed { path, source }
}
