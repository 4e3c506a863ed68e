//! 差异比较 - 判断源条目与目标条目是否需要重新复制

use crate::core::inventory::{FileInventory, InventoryEntry};
use crate::core::probe::EntryAttributes;
use serde::Serialize;
use tracing::debug;

/// 需要复制的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CopyReason {
    /// 目标中不存在
    Missing,
    /// 条目类型不同
    KindDiffers,
    /// 大小不同
    SizeDiffers,
    /// 修改时间不同
    ModifiedDiffers,
    /// 内容指纹不同（或缺失）
    FingerprintDiffers,
    /// 一侧没有可用的元数据
    Unprobed,
}

/// 同步动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// 复制（或创建目录）
    Copy { path: String, reason: CopyReason },
    /// 跳过（两边一致）
    Skip { path: String },
}

impl SyncAction {
    pub fn path(&self) -> &str {
        match self {
            SyncAction::Copy { path, .. } | SyncAction::Skip { path } => path,
        }
    }
}

/// 差异比较器
#[derive(Debug, Clone, Copy)]
pub struct FileComparator {
    use_fingerprint: bool,
}

impl FileComparator {
    pub fn new(use_fingerprint: bool) -> Self {
        Self { use_fingerprint }
    }

    /// 比较两个条目，返回第一个不一致的原因
    ///
    /// 按代价从低到高检查：类型、大小、修改时间（纳秒精度），启用指纹时最后比较指纹。
    /// 目录只会因类型不同而不一致。
    pub fn compare(
        &self,
        source: &EntryAttributes,
        dest: &EntryAttributes,
    ) -> Option<CopyReason> {
        if source.kind != dest.kind {
            return Some(CopyReason::KindDiffers);
        }
        if source.is_dir() {
            return None;
        }
        if source.size != dest.size {
            return Some(CopyReason::SizeDiffers);
        }
        if source.modified != dest.modified {
            return Some(CopyReason::ModifiedDiffers);
        }
        if self.use_fingerprint {
            // 任一侧缺少指纹时无法证明内容相同
            match (source.fingerprint, dest.fingerprint) {
                (Some(a), Some(b)) if a == b => {}
                _ => return Some(CopyReason::FingerprintDiffers),
            }
        }
        None
    }

    pub fn mismatch(&self, source: &EntryAttributes, dest: &EntryAttributes) -> bool {
        self.compare(source, dest).is_some()
    }

    /// 为单个源条目决定动作
    pub fn decide(&self, source: &InventoryEntry, dest: Option<&InventoryEntry>) -> SyncAction {
        let path = source.relative_path().to_string();

        let Some(dest) = dest else {
            return SyncAction::Copy {
                path,
                reason: CopyReason::Missing,
            };
        };

        let reason = match (source.attributes(), dest.attributes()) {
            (Some(src), Some(dst)) => self.compare(src, dst),
            _ => Some(CopyReason::Unprobed),
        };

        match reason {
            Some(reason) => {
                debug!("条目不一致: {} ({:?})", path, reason);
                SyncAction::Copy { path, reason }
            }
            None => SyncAction::Skip { path },
        }
    }

    /// 按源清单顺序比较两棵树，返回同步动作列表
    ///
    /// 源清单有序，因此目录总是排在其子条目之前。
    pub fn compare_trees(&self, source: &FileInventory, dest: &FileInventory) -> Vec<SyncAction> {
        source
            .iter()
            .map(|entry| {
                let counterpart = dest.find_by_relative_name(
                    entry.path(),
                    source.prefix_len(),
                    dest.prefix_len(),
                );
                self.decide(entry, counterpart)
            })
            .collect()
    }
}

/// 判断两个条目是否不一致
pub fn mismatch(source: &EntryAttributes, dest: &EntryAttributes, use_fingerprint: bool) -> bool {
    FileComparator::new(use_fingerprint).mismatch(source, dest)
}
