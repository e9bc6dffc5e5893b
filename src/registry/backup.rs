//! 登记册备份事务
//!
//! 把"先备份、再改动、成功提交、失败恢复"收敛成一个显式的
//! 事务对象，两个批处理场景共用同一套失败处理：
//! - `begin()`：把登记册复制成带时间戳的备份文件
//! - `commit()`：删除备份
//! - `rollback()`：用备份覆盖现场文件
//!
//! 备份必须在第一次单元格改动之前创建；只要备份还在，
//! 登记册就总能恢复到批处理开始前的状态。

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{AppError, AppResult};

/// 登记册备份事务
pub struct RegistryTransaction {
    registry_path: PathBuf,
    backup_path: Option<PathBuf>,
}

impl RegistryTransaction {
    pub fn new(registry_path: &Path) -> Self {
        Self {
            registry_path: registry_path.to_path_buf(),
            backup_path: None,
        }
    }

    /// 是否已创建备份
    pub fn active(&self) -> bool {
        self.backup_path.is_some()
    }

    /// 备份文件路径
    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    /// 开始事务：复制登记册到带时间戳的备份文件
    pub fn begin(&mut self) -> AppResult<()> {
        if self.active() {
            return Ok(());
        }
        let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S");
        let file_name = self
            .registry_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "registry".to_string());
        let backup_path = self
            .registry_path
            .with_file_name(format!("{}.backup.{}.xlsx", file_name, timestamp));

        std::fs::copy(&self.registry_path, &backup_path).map_err(|e| {
            AppError::backup_failed(self.registry_path.to_string_lossy(), e)
        })?;
        info!("已创建登记册备份: {}", backup_path.display());
        self.backup_path = Some(backup_path);
        Ok(())
    }

    /// 提交事务：删除备份
    pub fn commit(&mut self) -> AppResult<()> {
        if let Some(backup) = self.backup_path.take() {
            if let Err(e) = std::fs::remove_file(&backup) {
                // 备份残留不影响登记册本身，记下来即可
                warn!("删除备份文件失败 ({}): {}", backup.display(), e);
            }
        }
        Ok(())
    }

    /// 回滚事务：用备份覆盖现场文件，然后删除备份
    pub fn rollback(&mut self) -> AppResult<()> {
        if let Some(backup) = self.backup_path.take() {
            std::fs::copy(&backup, &self.registry_path).map_err(|e| {
                AppError::backup_failed(self.registry_path.to_string_lossy(), e)
            })?;
            let _ = std::fs::remove_file(&backup);
            info!("已从备份恢复登记册: {}", self.registry_path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_commit_deletes_backup() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry.xlsx");
        std::fs::write(&registry, b"original").unwrap();

        let mut tx = RegistryTransaction::new(&registry);
        tx.begin().unwrap();
        let backup = tx.backup_path().unwrap().to_path_buf();
        assert!(backup.exists());

        tx.commit().unwrap();
        assert!(!backup.exists());
        assert_eq!(std::fs::read(&registry).unwrap(), b"original");
    }

    #[test]
    fn test_rollback_restores_original() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry.xlsx");
        std::fs::write(&registry, b"original").unwrap();

        let mut tx = RegistryTransaction::new(&registry);
        tx.begin().unwrap();
        std::fs::write(&registry, b"mutated").unwrap();

        tx.rollback().unwrap();
        assert_eq!(std::fs::read(&registry).unwrap(), b"original");
        assert!(tx.backup_path().is_none());
    }

    #[test]
    fn test_begin_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry.xlsx");
        std::fs::write(&registry, b"original").unwrap();

        let mut tx = RegistryTransaction::new(&registry);
        tx.begin().unwrap();
        let first = tx.backup_path().unwrap().to_path_buf();
        tx.begin().unwrap();
        assert_eq!(tx.backup_path().unwrap(), first);
    }
}
