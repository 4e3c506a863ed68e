//! 文件清单 - 按相对路径有序保存一棵目录树的条目及其元数据

use crate::core::error::SyncError;
use crate::core::path::{concat_path, prefix_len};
use crate::core::probe::{EntryAttributes, EntryKind};
use std::cmp::Ordering;
use std::io::{self, Write};
use std::path::Path;

/// 清单中的单个条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    /// 完整路径（根目录前缀 + 相对路径）
    path: String,
    /// 相对路径在完整路径中的起始位置
    prefix_len: usize,
    /// 探测结果，未探测时为 `None`
    attrs: Option<EntryAttributes>,
}

impl InventoryEntry {
    pub fn new(root: &str, relative: &str) -> Result<Self, SyncError> {
        Ok(Self {
            path: concat_path(root, relative)?,
            prefix_len: prefix_len(root),
            attrs: None,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn full_path(&self) -> &Path {
        Path::new(&self.path)
    }

    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    pub fn relative_path(&self) -> &str {
        self.path.get(self.prefix_len..).unwrap_or("")
    }

    pub fn attributes(&self) -> Option<&EntryAttributes> {
        self.attrs.as_ref()
    }

    pub fn set_attributes(&mut self, attrs: EntryAttributes) {
        self.attrs = Some(attrs);
    }

    pub fn is_probed(&self) -> bool {
        self.attrs.is_some()
    }

    pub fn is_dir(&self) -> bool {
        self.attrs.as_ref().is_some_and(EntryAttributes::is_dir)
    }
}

/// 一棵目录树的有序清单
///
/// 条目按相对路径的字典序（字节序）升序排列，相对路径唯一。
/// `push_back` 只在调用方保证输入已有序时才维持这一不变式，否则需要随后调用 `sort_by_path`。
#[derive(Debug, Clone, Default)]
pub struct FileInventory {
    root: String,
    prefix_len: usize,
    entries: Vec<InventoryEntry>,
}

impl FileInventory {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let prefix_len = prefix_len(&root);
        Self {
            root,
            prefix_len,
            entries: Vec::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InventoryEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, InventoryEntry> {
        self.entries.iter_mut()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 按相对路径有序插入
    ///
    /// 从头线性扫描，在第一个不小于新路径的条目之前插入；路径已存在时不插入，
    /// 返回已有条目，第二个返回值为 `false`（调用方不应将其视为新探测的条目）。
    pub fn insert_ordered(
        &mut self,
        relative: &str,
    ) -> Result<(&mut InventoryEntry, bool), SyncError> {
        let entry = InventoryEntry::new(&self.root, relative)?;
        Ok(self.insert_entry(entry))
    }

    /// 有序插入一个已构造（可能已探测）的条目
    pub fn insert_entry(&mut self, entry: InventoryEntry) -> (&mut InventoryEntry, bool) {
        debug_assert_eq!(entry.prefix_len, self.prefix_len);

        // 尾部快速路径：有序输入时无需扫描
        let after_tail = self
            .entries
            .last()
            .map_or(true, |last| last.relative_path() < entry.relative_path());
        if after_tail {
            self.entries.push(entry);
            let last = self.entries.len() - 1;
            return (&mut self.entries[last], true);
        }

        let relative = entry.relative_path();
        let position = self
            .entries
            .iter()
            .position(|e| e.relative_path() >= relative);

        match position {
            Some(i) if self.entries[i].relative_path() == entry.relative_path() => {
                (&mut self.entries[i], false)
            }
            Some(i) => {
                self.entries.insert(i, entry);
                (&mut self.entries[i], true)
            }
            None => {
                self.entries.push(entry);
                let last = self.entries.len() - 1;
                (&mut self.entries[last], true)
            }
        }
    }

    /// 追加到尾部，不检查顺序
    pub fn push_back(&mut self, relative: &str) -> Result<&mut InventoryEntry, SyncError> {
        let entry = InventoryEntry::new(&self.root, relative)?;
        self.entries.push(entry);
        let last = self.entries.len() - 1;
        Ok(&mut self.entries[last])
    }

    /// 按相对路径排序并去除重复条目（保留先出现的）
    pub fn sort_by_path(&mut self) {
        self.entries
            .sort_by(|a, b| a.relative_path().cmp(b.relative_path()));
        self.entries
            .dedup_by(|later, earlier| later.relative_path() == earlier.relative_path());
    }

    /// 删除指定相对路径的条目
    pub fn remove(&mut self, relative: &str) -> Option<InventoryEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.relative_path() == relative)?;
        Some(self.entries.remove(index))
    }

    /// 按相对路径在本清单中查找对应条目
    ///
    /// `path` 是另一棵树中的完整路径，去掉 `source_prefix_len` 字节后得到相对路径；
    /// 本清单的条目去掉 `dest_prefix_len` 字节后参与比较。比较是逐字节的，
    /// 不做大小写折叠或规范化。清单有序，因此遇到第一个排在目标之后的候选即可判定不存在
    /// （候选以目标为前缀且更长时就属于这种情况）。
    pub fn find_by_relative_name(
        &self,
        path: &str,
        source_prefix_len: usize,
        dest_prefix_len: usize,
    ) -> Option<&InventoryEntry> {
        let target = path.get(source_prefix_len..)?;

        for entry in &self.entries {
            let candidate = entry.path.get(dest_prefix_len..).unwrap_or("");
            match candidate.cmp(target) {
                Ordering::Less => continue,
                Ordering::Equal => return Some(entry),
                Ordering::Greater => return None,
            }
        }
        None
    }

    /// 按相对路径查找
    pub fn get(&self, relative: &str) -> Option<&InventoryEntry> {
        self.entries
            .binary_search_by(|e| e.relative_path().cmp(relative))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// 相对路径是否严格升序
    pub fn is_sorted(&self) -> bool {
        self.entries
            .windows(2)
            .all(|w| w[0].relative_path() < w[1].relative_path())
    }

    /// 从头到尾每行输出一个完整路径
    pub fn display<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for entry in self.entries.iter() {
            writeln!(writer, "{}", entry.path)?;
        }
        Ok(())
    }

    /// 从尾到头每行输出一个完整路径
    pub fn display_reversed<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for entry in self.entries.iter().rev() {
            writeln!(writer, "{}", entry.path)?;
        }
        Ok(())
    }

    /// 带类型、权限、大小和指纹列的清单输出
    pub fn display_detailed<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for entry in self.entries.iter() {
            match entry.attributes() {
                Some(attrs) => {
                    let kind = match attrs.kind {
                        EntryKind::File => 'f',
                        EntryKind::Directory => 'd',
                    };
                    let fingerprint = attrs
                        .fingerprint
                        .map(|f| f.to_hex())
                        .unwrap_or_else(|| "-".repeat(32));
                    writeln!(
                        writer,
                        "{} {:04o} {:>12} {} {}",
                        kind, attrs.mode, attrs.size, fingerprint, entry.path
                    )?;
                }
                None => writeln!(writer, "? {}", entry.path)?,
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a FileInventory {
    type Item = &'a InventoryEntry;
    type IntoIter = std::slice::Iter<'a, InventoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
