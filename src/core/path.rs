//! 路径工具 - 目录前缀与相对路径的安全拼接

use crate::core::error::SyncError;

/// 路径最大长度（字节，含结束符）
pub const PATH_SIZE: usize = 4096;

/// 路径分隔符
pub const SEPARATOR: char = '/';

/// 拼接目录前缀与路径后缀
///
/// 前缀不以 `/` 结尾时补一个分隔符，已有则不重复添加。
/// 结果长度（加上结束符）超过 [`PATH_SIZE`] 时返回 `PathTooLong`。
pub fn concat_path(prefix: &str, suffix: &str) -> Result<String, SyncError> {
    let needs_separator = !prefix.ends_with(SEPARATOR);
    let total = prefix.len() + usize::from(needs_separator) + suffix.len();

    if total + 1 > PATH_SIZE {
        return Err(SyncError::PathTooLong {
            path: format!("{}{}{}", prefix, if needs_separator { "/" } else { "" }, suffix),
            limit: PATH_SIZE,
        });
    }

    let mut result = String::with_capacity(total);
    result.push_str(prefix);
    if needs_separator {
        result.push(SEPARATOR);
    }
    result.push_str(suffix);
    Ok(result)
}

/// 根目录前缀长度（含分隔符），即相对路径在完整路径中的起始位置
pub fn prefix_len(root: &str) -> usize {
    if root.ends_with(SEPARATOR) {
        root.len()
    } else {
        root.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_separator_when_missing() {
        assert_eq!(concat_path("/test/test2", "test.txt").unwrap(), "/test/test2/test.txt");
    }

    #[test]
    fn keeps_single_separator() {
        assert_eq!(concat_path("/test/test2/", "test.txt").unwrap(), "/test/test2/test.txt");
    }

    #[test]
    fn empty_suffix_yields_directory_prefix() {
        assert_eq!(concat_path("src", "").unwrap(), "src/");
    }

    #[test]
    fn rejects_overlong_result() {
        let prefix = "a".repeat(PATH_SIZE - 3);
        // 前缀 + '/' + "b" + 结束符 = PATH_SIZE，恰好放得下
        assert!(concat_path(&prefix, "b").is_ok());

        let err = concat_path(&prefix, "bc").unwrap_err();
        assert!(matches!(err, SyncError::PathTooLong { limit: PATH_SIZE, .. }));
    }

    #[test]
    fn prefix_len_counts_separator_once() {
        assert_eq!(prefix_len("src"), 4);
        assert_eq!(prefix_len("src/"), 4);
        assert_eq!(&concat_path("src", "a.txt").unwrap()[prefix_len("src")..], "a.txt");
    }
}
