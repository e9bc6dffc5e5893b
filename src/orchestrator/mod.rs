//! 编排层
//!
//! 顶层入口：编排批处理场景，管理登记册资源的生命周期，
//! 汇总统计并推送进度。

pub mod writer_service;

pub use writer_service::{BatchContext, GradeRegistryWriterService};
