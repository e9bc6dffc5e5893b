//! 登记册排他锁
//!
//! 对每个登记册路径维护一个侧车 `.lock` 文件，并在其上持有
//! 操作系统级的排他建议锁。获取是非阻塞的：要么立即成功，
//! 要么立即返回 Busy，绝不等待——卡住的批处理最多只会在
//! 自己的进程存活期间占住登记册。
//!
//! 锁的生命周期与句柄绑定（RAII）：`save` / `restore` / 显式
//! 释放 / 句柄析构，任何一条退出路径都会释放锁。

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, warn};

/// 锁侧车文件的后缀
const LOCK_SUFFIX: &str = ".lock";

#[derive(Debug, Error)]
pub enum LockError {
    /// 已有其他持有者
    #[error("登记册已被其他进程锁定: {path}")]
    Busy { path: String },
    /// 锁文件本身的 IO 失败
    #[error("锁文件操作失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 登记册锁句柄
///
/// 同一登记册路径同一时刻最多存在一个活跃句柄。
pub struct LockHandle {
    file: Option<File>,
    lock_path: PathBuf,
}

impl LockHandle {
    /// 显式释放锁并删除侧车文件
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = fs2::FileExt::unlock(&file) {
                warn!("释放登记册锁失败 ({}): {}", self.lock_path.display(), e);
            }
            drop(file);
            // 侧车文件只是标记，删不掉也不影响下次加锁
            let _ = std::fs::remove_file(&self.lock_path);
            debug!("已释放登记册锁: {}", self.lock_path.display());
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// 登记册排他锁
pub struct RegistryLock;

impl RegistryLock {
    /// 侧车锁文件路径
    pub fn lock_path(registry_path: &Path) -> PathBuf {
        let mut p = registry_path.as_os_str().to_owned();
        p.push(LOCK_SUFFIX);
        PathBuf::from(p)
    }

    /// 非阻塞地探测登记册是否已被锁定
    pub fn is_locked(registry_path: &Path) -> bool {
        let lock_path = Self::lock_path(registry_path);
        let file = match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(_) => return false,
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = fs2::FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }

    /// 尝试获取排他锁（立即成功或立即失败）
    pub fn try_acquire(registry_path: &Path) -> Result<LockHandle, LockError> {
        let lock_path = Self::lock_path(registry_path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| LockError::Io {
                path: lock_path.to_string_lossy().into_owned(),
                source: e,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("已获取登记册锁: {}", lock_path.display());
                Ok(LockHandle {
                    file: Some(file),
                    lock_path,
                })
            }
            Err(_) => Err(LockError::Busy {
                path: registry_path.to_string_lossy().into_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry.xlsx");
        std::fs::write(&registry, b"x").unwrap();

        let handle = RegistryLock::try_acquire(&registry).unwrap();
        handle.release();
        // 释放后可以再次获取
        let handle = RegistryLock::try_acquire(&registry).unwrap();
        drop(handle);
    }

    #[test]
    fn test_drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry.xlsx");
        std::fs::write(&registry, b"x").unwrap();

        {
            let _handle = RegistryLock::try_acquire(&registry).unwrap();
        }
        assert!(!RegistryLock::is_locked(&registry));
    }
}
