//! 审计日志
//!
//! 以 (操作人, 租户, 场景) 为键的只追加结构化日志：
//! 操作起止与耗时、每个文件的处理结果、每次成绩写入的新旧值、
//! 每次安全校验失败。一行一条 JSON 记录，本核心永远不回读。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};

use crate::models::GradeRecord;

/// 一条审计记录
#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    timestamp: String,
    user: &'a str,
    tenant: &'a str,
    scenario: &'a str,
    event: &'a str,
    detail: serde_json::Value,
}

/// 审计日志记录器
pub struct AuditLogger {
    user: String,
    tenant: String,
    scenario: String,
    log_file: PathBuf,
    started_at: Instant,
}

impl AuditLogger {
    pub fn new(
        user: impl Into<String>,
        tenant: impl Into<String>,
        scenario: impl Into<String>,
        log_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            user: user.into(),
            tenant: tenant.into(),
            scenario: scenario.into(),
            log_file: log_file.into(),
            started_at: Instant::now(),
        }
    }

    /// 记录操作开始
    pub fn operation_start(&self, target: &str) {
        self.append("operation_start", serde_json::json!({ "target": target }));
    }

    /// 记录操作结束（含耗时）
    pub fn operation_end(&self, success: bool, summary: &str) {
        self.append(
            "operation_end",
            serde_json::json!({
                "success": success,
                "summary": summary,
                "duration_ms": self.started_at.elapsed().as_millis() as u64,
            }),
        );
    }

    /// 记录单个文件的处理结果
    pub fn file_outcome(&self, file_name: &str, success: bool, message: Option<&str>) {
        self.append(
            "file_outcome",
            serde_json::json!({
                "file": file_name,
                "success": success,
                "message": message,
            }),
        );
    }

    /// 记录一次成绩写入（含旧值，覆盖可追溯）
    pub fn grade_write(&self, record: &GradeRecord, column: u32) {
        self.append(
            "grade_write",
            serde_json::json!({
                "student": record.student_name,
                "column": column,
                "old": record.old_value,
                "new": record.grade.as_str(),
            }),
        );
    }

    /// 记录一次安全校验失败
    pub fn validation_failure(&self, path: &str, reason: &str) {
        self.append(
            "validation_failure",
            serde_json::json!({ "path": path, "reason": reason }),
        );
    }

    fn append(&self, event: &str, detail: serde_json::Value) {
        let record = AuditRecord {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            user: &self.user,
            tenant: &self.tenant,
            scenario: &self.scenario,
            event,
            detail,
        };
        info!(
            "审计 [{}:{}:{}] {}: {}",
            self.user, self.tenant, self.scenario, event, record.detail
        );
        match serde_json::to_string(&record) {
            Ok(line) => {
                let result = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.log_file)
                    .and_then(|mut f| writeln!(f, "{}", line));
                if let Err(e) = result {
                    // 审计写盘失败不能中断批处理，降级为进程日志
                    warn!("审计日志写入失败 ({}): {}", self.log_file.display(), e);
                }
            }
            Err(e) => warn!("审计记录序列化失败: {}", e),
        }
    }
}
