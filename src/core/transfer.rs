//! 同步执行 - 将源条目复制到目标树并恢复权限与修改时间

use crate::core::error::SyncError;
use crate::core::inventory::InventoryEntry;
use crate::core::path::concat_path;
use crate::core::probe::{EntryAttributes, EntryKind};
use filetime::FileTime;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// 单个条目的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// 已复制文件
    Copied { bytes: u64 },
    /// 已创建目录
    DirCreated,
    /// 目录已存在
    DirExisted,
    /// 演练模式：将会复制文件
    WouldCopy { bytes: u64 },
    /// 演练模式：将会创建目录
    WouldCreateDir,
}

impl CopyOutcome {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, CopyOutcome::WouldCopy { .. } | CopyOutcome::WouldCreateDir)
    }
}

/// 同步执行器
///
/// 演练模式下照常做出所有判断，只在每个会修改文件系统的调用处分支，改为记录将要执行的操作。
#[derive(Debug, Clone)]
pub struct SyncExecutor {
    dest_root: String,
    dry_run: bool,
}

impl SyncExecutor {
    pub fn new(dest_root: impl Into<String>, dry_run: bool) -> Self {
        Self {
            dest_root: dest_root.into(),
            dry_run,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// 目标路径：用目标根目录替换源条目的根目录前缀
    pub fn destination_path(&self, entry: &InventoryEntry) -> Result<String, SyncError> {
        concat_path(&self.dest_root, entry.relative_path())
    }

    /// 复制一个已探测的源条目
    pub fn apply_copy(&self, entry: &InventoryEntry) -> Result<CopyOutcome, SyncError> {
        let attrs = entry.attributes().ok_or_else(|| SyncError::StatFailed {
            path: entry.full_path().to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, "条目尚未探测"),
        })?;
        let dest = self.destination_path(entry)?;
        let dest = Path::new(&dest);

        debug!("同步: {} -> {}", entry.path(), dest.display());

        match attrs.kind {
            EntryKind::Directory => self.create_dir(dest, attrs.mode),
            EntryKind::File => self.copy_file(entry.full_path(), dest, attrs),
        }
    }

    fn create_dir(&self, dest: &Path, mode: u32) -> Result<CopyOutcome, SyncError> {
        if self.dry_run {
            if fs::symlink_metadata(dest).is_ok() {
                return existing_dir(dest);
            }
            info!("[dry-run] 创建目录: {} ({:04o})", dest.display(), mode);
            return Ok(CopyOutcome::WouldCreateDir);
        }

        match create_dir_with_mode(dest, mode) {
            Ok(()) => {
                debug!("创建目录: {} ({:04o})", dest.display(), mode);
                Ok(CopyOutcome::DirCreated)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => existing_dir(dest),
            Err(source) => Err(SyncError::DirCreateFailed {
                path: dest.to_path_buf(),
                source,
            }),
        }
    }

    fn copy_file(
        &self,
        source: &Path,
        dest: &Path,
        attrs: &EntryAttributes,
    ) -> Result<CopyOutcome, SyncError> {
        let mut reader = File::open(source).map_err(|source_err| SyncError::OpenFailed {
            path: source.to_path_buf(),
            source: source_err,
        })?;

        if self.dry_run {
            info!(
                "[dry-run] 复制文件: {} -> {} ({} 字节)",
                source.display(),
                dest.display(),
                attrs.size
            );
            return Ok(CopyOutcome::WouldCopy { bytes: attrs.size });
        }

        let mut writer = open_destination(dest, attrs.mode).map_err(|source| {
            SyncError::OpenFailed {
                path: dest.to_path_buf(),
                source,
            }
        })?;

        // Linux 上 File 之间的 io::copy 会使用 copy_file_range/sendfile
        let bytes = io::copy(&mut reader, &mut writer).map_err(|source| SyncError::CopyFailed {
            path: dest.to_path_buf(),
            source,
        })?;
        drop(writer);

        restore_attributes(dest, attrs).map_err(|source| SyncError::AttributeRestoreFailed {
            path: dest.to_path_buf(),
            source,
        })?;

        debug!("复制完成: {} ({} 字节)", dest.display(), bytes);
        Ok(CopyOutcome::Copied { bytes })
    }
}

/// 目标路径已被占用：是目录则视为已存在，否则无法创建
fn existing_dir(dest: &Path) -> Result<CopyOutcome, SyncError> {
    if dest.is_dir() {
        return Ok(CopyOutcome::DirExisted);
    }
    Err(SyncError::DirCreateFailed {
        path: dest.to_path_buf(),
        source: io::Error::new(io::ErrorKind::AlreadyExists, "目标路径已存在且不是目录"),
    })
}

/// 打开目标文件写入；已存在的只读目标先为属主加上写权限再重试，最终权限由 `restore_attributes` 恢复
fn open_destination(dest: &Path, mode: u32) -> io::Result<File> {
    match create_file_with_mode(dest, mode) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            let metadata = match fs::symlink_metadata(dest) {
                Ok(m) if m.is_file() => m,
                _ => return Err(e),
            };
            let mut permissions = metadata.permissions();
            if !grant_owner_write(&mut permissions) {
                return Err(e);
            }
            debug!("目标文件只读, 临时加上写权限: {}", dest.display());
            fs::set_permissions(dest, permissions)?;
            create_file_with_mode(dest, mode)
        }
        other => other,
    }
}

/// 为属主加上写权限，已有写权限时返回 `false`
#[cfg(unix)]
fn grant_owner_write(permissions: &mut fs::Permissions) -> bool {
    use std::os::unix::fs::PermissionsExt;
    let mode = permissions.mode();
    if mode & 0o200 != 0 {
        return false;
    }
    permissions.set_mode(mode | 0o200);
    true
}

#[cfg(not(unix))]
fn grant_owner_write(permissions: &mut fs::Permissions) -> bool {
    if !permissions.readonly() {
        return false;
    }
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    true
}

/// 恢复权限位与修改时间（访问时间设为当前时间）
fn restore_attributes(dest: &Path, attrs: &EntryAttributes) -> io::Result<()> {
    set_mode(dest, attrs.mode)?;
    if let Some(modified) = attrs.modified {
        filetime::set_file_times(
            dest,
            FileTime::now(),
            FileTime::from_system_time(modified),
        )?;
    }
    Ok(())
}

#[cfg(unix)]
fn create_dir_with_mode(dest: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().mode(mode).create(dest)?;
    // umask 可能屏蔽部分权限位
    set_mode(dest, mode)
}

#[cfg(not(unix))]
fn create_dir_with_mode(dest: &Path, mode: u32) -> io::Result<()> {
    fs::create_dir(dest)?;
    set_mode(dest, mode)
}

#[cfg(unix)]
fn create_file_with_mode(dest: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(dest)
}

#[cfg(not(unix))]
fn create_file_with_mode(dest: &Path, _mode: u32) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(dest)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, permissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inventory::FileInventory;
    use crate::core::probe::probe;
    use std::time::{Duration, SystemTime};

    struct Fixture {
        source: tempfile::TempDir,
        dest: tempfile::TempDir,
        inventory: FileInventory,
    }

    impl Fixture {
        fn new() -> Self {
            let source = tempfile::tempdir().unwrap();
            let dest = tempfile::tempdir().unwrap();
            let inventory = FileInventory::new(source.path().to_str().unwrap());
            Self {
                source,
                dest,
                inventory,
            }
        }

        fn add(&mut self, relative: &str) -> &InventoryEntry {
            let (entry, _) = self.inventory.insert_ordered(relative).unwrap();
            let attrs = probe(entry.full_path(), true).unwrap();
            entry.set_attributes(attrs);
            self.inventory.get(relative).unwrap()
        }

        fn executor(&self, dry_run: bool) -> SyncExecutor {
            SyncExecutor::new(self.dest.path().to_str().unwrap(), dry_run)
        }
    }

    #[test]
    fn copies_file_and_restores_mtime() {
        let mut fx = Fixture::new();
        let src = fx.source.path().join("a.txt");
        fs::write(&src, b"0123456789").unwrap();
        let mtime = SystemTime::UNIX_EPOCH + Duration::new(1_600_000_000, 123_456_789);
        filetime::set_file_mtime(&src, FileTime::from_system_time(mtime)).unwrap();

        let executor = fx.executor(false);
        let entry = fx.add("a.txt").clone();
        let outcome = executor.apply_copy(&entry).unwrap();
        assert_eq!(outcome, CopyOutcome::Copied { bytes: 10 });

        let dest = fx.dest.path().join("a.txt");
        assert_eq!(fs::read(&dest).unwrap(), b"0123456789");
        assert_eq!(fs::metadata(&dest).unwrap().modified().unwrap(), mtime);
    }

    #[cfg(unix)]
    #[test]
    fn copies_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let mut fx = Fixture::new();
        let src = fx.source.path().join("run.sh");
        fs::write(&src, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o751)).unwrap();

        let executor = fx.executor(false);
        let entry = fx.add("run.sh").clone();
        executor.apply_copy(&entry).unwrap();

        let mode = fs::metadata(fx.dest.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o7777, 0o751);
    }

    #[test]
    fn existing_directory_is_not_an_error() {
        let mut fx = Fixture::new();
        fs::create_dir(fx.source.path().join("sub")).unwrap();
        fs::create_dir(fx.dest.path().join("sub")).unwrap();

        let executor = fx.executor(false);
        let entry = fx.add("sub").clone();
        assert_eq!(executor.apply_copy(&entry).unwrap(), CopyOutcome::DirExisted);
    }

    #[test]
    fn creates_missing_directory() {
        let mut fx = Fixture::new();
        fs::create_dir(fx.source.path().join("sub")).unwrap();

        let executor = fx.executor(false);
        let entry = fx.add("sub").clone();
        assert_eq!(executor.apply_copy(&entry).unwrap(), CopyOutcome::DirCreated);
        assert!(fx.dest.path().join("sub").is_dir());
    }

    #[test]
    fn dry_run_leaves_destination_untouched() {
        let mut fx = Fixture::new();
        fs::write(fx.source.path().join("a.txt"), b"abc").unwrap();
        fs::create_dir(fx.source.path().join("sub")).unwrap();

        let executor = fx.executor(true);
        let file = fx.add("a.txt").clone();
        let dir = fx.add("sub").clone();

        assert_eq!(
            executor.apply_copy(&file).unwrap(),
            CopyOutcome::WouldCopy { bytes: 3 }
        );
        assert_eq!(executor.apply_copy(&dir).unwrap(), CopyOutcome::WouldCreateDir);
        assert_eq!(fs::read_dir(fx.dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn file_in_place_of_directory_fails_in_both_modes() {
        let mut fx = Fixture::new();
        fs::create_dir(fx.source.path().join("sub")).unwrap();
        fs::write(fx.dest.path().join("sub"), b"not a dir").unwrap();
        let entry = fx.add("sub").clone();

        for dry_run in [true, false] {
            let err = fx.executor(dry_run).apply_copy(&entry).unwrap_err();
            assert!(matches!(err, SyncError::DirCreateFailed { .. }));
        }
        assert!(fx.dest.path().join("sub").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn read_only_destination_is_rewritten() {
        use std::os::unix::fs::PermissionsExt;

        let mut fx = Fixture::new();
        let src = fx.source.path().join("ro.txt");
        fs::write(&src, b"v1").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o444)).unwrap();
        let entry = fx.add("ro.txt").clone();
        fx.executor(false).apply_copy(&entry).unwrap();

        fs::set_permissions(&src, fs::Permissions::from_mode(0o644)).unwrap();
        fs::write(&src, b"v2").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o444)).unwrap();
        fx.inventory.clear();
        let entry = fx.add("ro.txt").clone();

        let outcome = fx.executor(false).apply_copy(&entry).unwrap();
        assert_eq!(outcome, CopyOutcome::Copied { bytes: 2 });

        let dest = fx.dest.path().join("ro.txt");
        assert_eq!(fs::read(&dest).unwrap(), b"v2");
        let mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o444);
    }

    #[cfg(unix)]
    #[test]
    fn owner_write_is_granted_once() {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = fs::Permissions::from_mode(0o444);
        assert!(grant_owner_write(&mut permissions));
        assert_eq!(permissions.mode() & 0o777, 0o644);
        assert!(!grant_owner_write(&mut permissions));
    }

    #[test]
    fn missing_parent_directory_fails_the_entry() {
        let mut fx = Fixture::new();
        fs::create_dir(fx.source.path().join("sub")).unwrap();
        fs::write(fx.source.path().join("sub/b.txt"), b"b").unwrap();

        let executor = fx.executor(false);
        let entry = fx.add("sub/b.txt").clone();
        let err = executor.apply_copy(&entry).unwrap_err();
        assert!(matches!(err, SyncError::OpenFailed { .. }));
    }

    #[test]
    fn destination_path_substitutes_root_once() {
        let mut inventory = FileInventory::new("/data/src/");
        let (entry, _) = inventory.insert_ordered("sub/b.txt").unwrap();
        let executor = SyncExecutor::new("/backup/dst", false);
        assert_eq!(
            executor.destination_path(entry).unwrap(),
            "/backup/dst/sub/b.txt"
        );
    }
}
