//! 元数据与指纹探测 - 为清单条目获取类型、权限、大小、修改时间和 MD5

use crate::core::error::SyncError;
use md5::{Digest, Md5};
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{ErrorKind as IoErrorKind, Read};
use std::path::Path;
use std::time::SystemTime;

/// 计算指纹时每次读取的块大小
pub const FINGERPRINT_CHUNK_SIZE: usize = 1024;

/// 条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    File,
    Directory,
}

/// 文件内容的 MD5 指纹（16 字节）
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 16]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 探测得到的条目属性
///
/// 目录只有 `kind` 和 `mode` 有意义，`size` 为 0，`modified` 与 `fingerprint` 为 `None`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAttributes {
    pub kind: EntryKind,
    /// 权限位（不含文件类型位）
    pub mode: u32,
    pub size: u64,
    /// 修改时间（纳秒精度）
    pub modified: Option<SystemTime>,
    pub fingerprint: Option<Fingerprint>,
}

impl EntryAttributes {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// 探测路径的元数据，必要时计算指纹
///
/// 类型判断不跟随符号链接：既不是普通文件也不是目录的条目（符号链接、设备、管道等）
/// 返回 `UnsupportedEntryKind`。
pub fn probe(path: &Path, with_fingerprint: bool) -> Result<EntryAttributes, SyncError> {
    let metadata = fs::symlink_metadata(path).map_err(|source| SyncError::StatFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let file_type = metadata.file_type();
    let mode = permission_bits(&metadata);

    if file_type.is_dir() {
        return Ok(EntryAttributes {
            kind: EntryKind::Directory,
            mode,
            size: 0,
            modified: None,
            fingerprint: None,
        });
    }

    if !file_type.is_file() {
        return Err(SyncError::UnsupportedEntryKind {
            path: path.to_path_buf(),
        });
    }

    let modified = metadata.modified().map_err(|source| SyncError::StatFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let fingerprint = if with_fingerprint {
        Some(compute_fingerprint(path)?)
    } else {
        None
    };

    Ok(EntryAttributes {
        kind: EntryKind::File,
        mode,
        size: metadata.len(),
        modified: Some(modified),
        fingerprint,
    })
}

/// 以固定大小的块流式读取文件并计算 MD5，内存占用与文件大小无关
pub fn compute_fingerprint(path: &Path) -> Result<Fingerprint, SyncError> {
    let mut file = File::open(path).map_err(|source| SyncError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Md5::new();
    let mut buffer = [0u8; FINGERPRINT_CHUNK_SIZE];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(SyncError::ReadFailed {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        hasher.update(&buffer[..read]);
    }

    Ok(Fingerprint(hasher.finalize().into()))
}

/// 判断目录是否存在（能否作为目录打开）
pub fn directory_exists(path: &Path) -> bool {
    fs::read_dir(path).is_ok()
}

/// 判断当前用户能否在目录中创建文件
///
/// 权限位无法反映属主与有效用户的关系，因此直接在目录中创建一个匿名临时文件试探。
pub fn is_directory_writable(path: &Path) -> bool {
    let is_dir = fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false);
    is_dir && tempfile::tempfile_in(path).is_ok()
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    // 非 Unix 平台只有只读标志可用
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, false) => 0o755,
        (true, true) => 0o555,
        (false, false) => 0o644,
        (false, true) => 0o444,
    }
}
