//! 登记册层
//!
//! 持有共享的登记册文件这一稀缺资源：排他锁、备份事务、
//! 工作簿的加载/验证/写入/保存。

pub mod backup;
pub mod lock;
pub mod manager;

pub use backup::RegistryTransaction;
pub use lock::{LockError, LockHandle, RegistryLock};
pub use manager::{RegistryManager, WriteOutcome};
