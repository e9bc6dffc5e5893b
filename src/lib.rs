//! # Grade Registry
//!
//! 一个把已判定的成绩写入班级成绩登记册的 Rust 子系统
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 登记册层（Registry）
//! - `registry/` - 持有稀缺资源（登记册文件），只暴露能力
//! - `RegistryManager` - 唯一的工作簿 owner，提供加载/验证/写入/保存能力
//! - `RegistryLock` / `RegistryTransaction` - 排他锁与备份事务
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个文件/姓名
//! - `GradeValueExtractor` - Word/表格成绩提取能力
//! - `AssignmentNumberResolver` - 作业序号解析能力
//! - `NameMatcher` - 姓名匹配能力
//! - `FileValidator` - 安全校验能力
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/writer_service` - 批处理服务，编排两种扫描场景，
//!   管理备份/提交/回滚和部分失败统计
//!
//! ### ④ 观测层（Observability）
//! - `progress` - 按跟踪号轮询的进度快照（带 TTL 的注入式存储）
//! - `audit` - 只追加的结构化审计日志
//!
//! ## 模块结构

pub mod audit;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use audit::AuditLogger;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{BatchStatistics, FileOutcome, Grade, MatchKind, ProcessOutcome, ProgressState};
pub use orchestrator::{BatchContext, GradeRegistryWriterService};
pub use progress::{MokaProgressStore, ProgressStore, ProgressTracker};
pub use registry::{RegistryLock, RegistryManager, RegistryTransaction, WriteOutcome};
pub use services::{AssignmentNumberResolver, FileValidator, GradeValueExtractor, NameMatcher};
