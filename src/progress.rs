//! 进度跟踪
//!
//! 写多读少的轮询式状态：批处理每处理完一个文件就整体替换
//! 一次快照，外部轮询方按 tracking id 读取最近一次快照。
//! 存储通过 [`ProgressStore`] 注入（不做进程级单例），默认实现
//! 是带 TTL 的内存缓存。

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use moka::sync::Cache;

use crate::models::{BatchStatistics, ProgressState, ProgressStatus};

/// 进度存储抽象（get/set/remove，带过期）
pub trait ProgressStore: Send + Sync {
    fn get(&self, tracking_id: &str) -> Option<ProgressState>;
    fn set(&self, tracking_id: &str, state: ProgressState);
    fn remove(&self, tracking_id: &str);
}

/// 默认实现：moka 内存缓存，按写入时间过期
pub struct MokaProgressStore {
    cache: Cache<String, ProgressState>,
}

impl MokaProgressStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().time_to_live(ttl).build(),
        }
    }
}

impl ProgressStore for MokaProgressStore {
    fn get(&self, tracking_id: &str) -> Option<ProgressState> {
        self.cache.get(tracking_id)
    }

    fn set(&self, tracking_id: &str, state: ProgressState) {
        self.cache.insert(tracking_id.to_string(), state);
    }

    fn remove(&self, tracking_id: &str) {
        self.cache.invalidate(tracking_id);
    }
}

/// 单个批处理任务的进度跟踪器
///
/// 每次调用都整体覆盖缓存里的快照，外部不会读到写了一半的状态。
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    tracking_id: String,
    state: ProgressState,
}

impl ProgressTracker {
    pub fn start(store: Arc<dyn ProgressStore>, tracking_id: impl Into<String>) -> Self {
        let tracking_id = tracking_id.into();
        let state = ProgressState::started();
        store.set(&tracking_id, state.clone());
        Self {
            store,
            tracking_id,
            state,
        }
    }

    pub fn update_total(&mut self, total: usize) {
        self.state.total = total;
        self.push();
    }

    pub fn update_progress(
        &mut self,
        processed: usize,
        success: usize,
        failed: usize,
        skipped: usize,
        current_file: &str,
    ) {
        self.state.processed = processed;
        self.state.success = success;
        self.state.failed = failed;
        self.state.skipped = skipped;
        self.state.current_file = Some(current_file.to_string());
        self.push();
    }

    pub fn complete(&mut self, statistics: BatchStatistics) {
        self.state.status = ProgressStatus::Completed;
        self.state.processed = statistics.total;
        self.state.success = statistics.success;
        self.state.failed = statistics.failed;
        self.state.skipped = statistics.skipped;
        self.state.current_file = None;
        self.state.message = Some(format!(
            "完成: 成功 {}/{}, 失败 {}, 跳过 {}",
            statistics.success, statistics.total, statistics.failed, statistics.skipped
        ));
        self.push();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.state.status = ProgressStatus::Failed;
        self.state.current_file = None;
        self.state.message = Some(message.into());
        self.push();
    }

    fn push(&mut self) {
        self.state.updated_at = Local::now();
        self.store.set(&self.tracking_id, self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_lifecycle() {
        let store: Arc<dyn ProgressStore> =
            Arc::new(MokaProgressStore::new(Duration::from_secs(60)));
        let mut tracker = ProgressTracker::start(store.clone(), "job-1");

        let state = store.get("job-1").unwrap();
        assert_eq!(state.status, ProgressStatus::Running);

        tracker.update_total(3);
        tracker.update_progress(1, 1, 0, 0, "张三_作业1.docx");
        let state = store.get("job-1").unwrap();
        assert_eq!(state.total, 3);
        assert_eq!(state.processed, 1);
        assert_eq!(state.current_file.as_deref(), Some("张三_作业1.docx"));

        tracker.complete(BatchStatistics {
            total: 3,
            success: 2,
            failed: 1,
            skipped: 0,
        });
        let state = store.get("job-1").unwrap();
        assert_eq!(state.status, ProgressStatus::Completed);
        assert!(state.current_file.is_none());
    }

    #[test]
    fn test_fail_overwrites_snapshot() {
        let store: Arc<dyn ProgressStore> =
            Arc::new(MokaProgressStore::new(Duration::from_secs(60)));
        let mut tracker = ProgressTracker::start(store.clone(), "job-2");
        tracker.fail("登记册已被其他进程锁定");

        let state = store.get("job-2").unwrap();
        assert_eq!(state.status, ProgressStatus::Failed);
        assert!(state.message.unwrap().contains("锁定"));
    }
}
