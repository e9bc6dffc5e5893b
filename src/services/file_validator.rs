//! 文件安全校验服务
//!
//! 在任何文件被读取之前运行的校验管线：
//! 1. 路径收敛（解析后必须落在基准目录内）
//! 2. 拒绝目录穿越序列和携带 shell 元字符的路径
//! 3. 拒绝符号链接
//! 4. 大小边界（非空且不超过上限）
//! 5. 表格文件：行/列数上限 + 试开探测（拒绝损坏的容器）
//!
//! 另外提供格式锁定标记的检查：提交文件旁边存在 `<文件名>.format-lock`
//! 侧车文件时，说明该文件已被格式校验流程锁定，不得尝试提取成绩。

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{AppError, AppResult, ValidationError};

/// 路径中不允许出现的 shell 元字符
const ILLEGAL_CHARS: &[char] = &[';', '|', '&', '$', '`', '<', '>', '*', '?', '"', '\''];

/// 格式锁定侧车文件的后缀
const FORMAT_LOCK_SUFFIX: &str = ".format-lock";

/// 文件安全校验服务
pub struct FileValidator {
    base_dir: PathBuf,
    max_file_size: u64,
    max_sheet_rows: u32,
    max_sheet_cols: u32,
}

impl FileValidator {
    pub fn new(config: &Config) -> Self {
        Self {
            base_dir: PathBuf::from(&config.base_dir),
            max_file_size: config.max_file_size,
            max_sheet_rows: config.max_sheet_rows,
            max_sheet_cols: config.max_sheet_cols,
        }
    }

    /// 对普通提交文件运行完整校验管线
    pub fn validate_submission(&self, path: &Path) -> AppResult<()> {
        self.validate_path(path)?;
        self.validate_size(path)?;
        Ok(())
    }

    /// 对表格文件运行完整校验管线（含结构边界和试开探测）
    pub fn validate_spreadsheet(&self, path: &Path) -> AppResult<()> {
        self.validate_path(path)?;
        self.validate_size(path)?;
        self.validate_sheet_structure(path)?;
        Ok(())
    }

    /// 路径校验：穿越序列、非法字符、符号链接、基准目录收敛
    pub fn validate_path(&self, path: &Path) -> AppResult<()> {
        let raw = path.to_string_lossy();
        if raw.contains("..") {
            return Err(AppError::Validation(ValidationError::IllegalPath {
                path: raw.into_owned(),
                reason: "包含目录穿越序列".to_string(),
            }));
        }
        if let Some(c) = raw.chars().find(|c| ILLEGAL_CHARS.contains(c)) {
            return Err(AppError::Validation(ValidationError::IllegalPath {
                path: raw.into_owned(),
                reason: format!("包含非法字符 '{}'", c),
            }));
        }

        let metadata = std::fs::symlink_metadata(path).map_err(|_| {
            AppError::Validation(ValidationError::IllegalPath {
                path: raw.clone().into_owned(),
                reason: "文件不存在或不可访问".to_string(),
            })
        })?;
        if metadata.file_type().is_symlink() {
            return Err(AppError::Validation(ValidationError::SymlinkRejected {
                path: raw.into_owned(),
            }));
        }

        let canonical = path.canonicalize().map_err(|_| {
            AppError::Validation(ValidationError::IllegalPath {
                path: raw.clone().into_owned(),
                reason: "路径无法解析".to_string(),
            })
        })?;
        let canonical_base = self.base_dir.canonicalize().map_err(|_| {
            AppError::Validation(ValidationError::IllegalPath {
                path: self.base_dir.to_string_lossy().into_owned(),
                reason: "基准目录无法解析".to_string(),
            })
        })?;
        if !canonical.starts_with(&canonical_base) {
            return Err(AppError::Validation(ValidationError::PathOutsideBase {
                path: raw.into_owned(),
            }));
        }
        Ok(())
    }

    /// 大小校验：文件必须非空且不超过上限
    fn validate_size(&self, path: &Path) -> AppResult<()> {
        let size = std::fs::metadata(path)?.len();
        if size == 0 || size > self.max_file_size {
            return Err(AppError::Validation(ValidationError::SizeOutOfBounds {
                path: path.to_string_lossy().into_owned(),
                size,
                max: self.max_file_size,
            }));
        }
        Ok(())
    }

    /// 表格结构校验：行/列上限 + 试开探测
    fn validate_sheet_structure(&self, path: &Path) -> AppResult<()> {
        let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| {
            AppError::Validation(ValidationError::StructureInvalid {
                path: path.to_string_lossy().into_owned(),
                reason: format!("容器损坏: {}", e),
            })
        })?;
        let sheet = book.get_sheet(&0).ok_or_else(|| {
            AppError::Validation(ValidationError::StructureInvalid {
                path: path.to_string_lossy().into_owned(),
                reason: "没有工作表".to_string(),
            })
        })?;
        let rows = sheet.get_highest_row();
        let cols = sheet.get_highest_column();
        if rows > self.max_sheet_rows || cols > self.max_sheet_cols {
            return Err(AppError::Validation(ValidationError::StructureInvalid {
                path: path.to_string_lossy().into_owned(),
                reason: format!(
                    "行列数越界 ({} 行 {} 列, 上限 {} 行 {} 列)",
                    rows, cols, self.max_sheet_rows, self.max_sheet_cols
                ),
            }));
        }
        Ok(())
    }

    /// 检查提交文件是否已被格式校验流程锁定
    ///
    /// 锁定的文件必须跳过成绩提取，由调用方上报 locked 错误。
    pub fn is_format_locked(&self, path: &Path) -> bool {
        let mut marker = path.as_os_str().to_owned();
        marker.push(FORMAT_LOCK_SUFFIX);
        Path::new(&marker).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(base: &Path) -> FileValidator {
        let config = Config {
            base_dir: base.to_string_lossy().into_owned(),
            ..Config::default()
        };
        FileValidator::new(&config)
    }

    #[test]
    fn test_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let v = validator(dir.path());
        let err = v.validate_path(&dir.path().join("../etc/passwd")).unwrap_err();
        assert!(err.to_string().contains("穿越"));
    }

    #[test]
    fn test_illegal_chars_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let v = validator(dir.path());
        let err = v.validate_path(&dir.path().join("a;rm.docx")).unwrap_err();
        assert!(err.to_string().contains("非法字符"));
    }

    #[test]
    fn test_outside_base_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let outside = other.path().join("x.docx");
        std::fs::write(&outside, b"data").unwrap();
        let v = validator(dir.path());
        let err = v.validate_path(&outside).unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::PathOutsideBase { .. })
        ));
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.docx");
        std::fs::write(&file, b"").unwrap();
        let v = validator(dir.path());
        let err = v.validate_submission(&file).unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::SizeOutOfBounds { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.docx");
        std::fs::write(&target, b"data").unwrap();
        let link = dir.path().join("link.docx");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let v = validator(dir.path());
        let err = v.validate_path(&link).unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::SymlinkRejected { .. })
        ));
    }

    #[test]
    fn test_format_lock_marker() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("张三_作业1.docx");
        std::fs::write(&file, b"data").unwrap();
        let v = validator(dir.path());
        assert!(!v.is_format_locked(&file));
        std::fs::write(dir.path().join("张三_作业1.docx.format-lock"), b"").unwrap();
        assert!(v.is_format_locked(&file));
    }

    #[test]
    fn test_valid_file_passes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ok.docx");
        std::fs::write(&file, b"data").unwrap();
        let v = validator(dir.path());
        assert!(v.validate_submission(&file).is_ok());
    }
}
