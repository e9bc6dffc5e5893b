//! 成绩登记批处理服务 - 编排层
//!
//! ## 职责
//!
//! 本模块是成绩登记子系统的入口，编排两种批处理场景：
//!
//! 1. **目录扫描**（一次作业、多个学生）：从作业目录名解析作业序号，
//!    递归枚举 Word 提交文件，逐个提取成绩、匹配学生、写入登记册
//! 2. **班级扫描**（多次作业、多个学生）：枚举班级目录下的成绩表格，
//!    按文件批量提取名单，逐行匹配写入
//!
//! ## 设计特点
//!
//! - **顺序执行**：一次批处理是单个顺序任务，回滚单位是整个批
//! - **先备份后写**：任何单元格变更之前先创建备份，保存成功删备份，
//!   中途失败用备份恢复
//! - **部分失败**：单个文件/单行的失败只记入统计，不中断批处理；
//!   只有登记册自身的前置条件/安全/锁失败才终止整个批
//! - **可观测**：每处理完一个文件推送一次进度快照，所有校验失败和
//!   成绩写入都进审计日志

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::audit::AuditLogger;
use crate::config::Config;
use crate::error::{AppError, AppResult, BusinessError};
use crate::models::{
    BatchStatistics, FileOutcome, GradeRecord, MatchKind, ProcessOutcome, ProgressState,
};
use crate::progress::{ProgressStore, ProgressTracker};
use crate::registry::RegistryManager;
use crate::services::{
    AssignmentNumberResolver, FileValidator, GradeValueExtractor, NameMatcher,
};
use crate::utils::logging;

/// 批处理调用的上下文（操作人 / 租户 / 跟踪号）
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub user: String,
    pub tenant: String,
    pub tracking_id: String,
}

/// 成绩登记批处理服务
pub struct GradeRegistryWriterService {
    config: Config,
    extractor: GradeValueExtractor,
    resolver: AssignmentNumberResolver,
    matcher: NameMatcher,
    validator: FileValidator,
    progress_store: Arc<dyn ProgressStore>,
}

impl GradeRegistryWriterService {
    pub fn new(config: Config, progress_store: Arc<dyn ProgressStore>) -> Self {
        let extractor = GradeValueExtractor::new(config.header_scan_rows);
        let validator = FileValidator::new(&config);
        Self {
            config,
            extractor,
            resolver: AssignmentNumberResolver::new(),
            matcher: NameMatcher::new(),
            validator,
            progress_store,
        }
    }

    /// 读取某个批处理任务的最近进度快照
    pub fn get_progress(&self, tracking_id: &str) -> Option<ProgressState> {
        self.progress_store.get(tracking_id)
    }

    /// 目录扫描场景：一次作业、多个学生的 Word 提交
    pub async fn process_assignment_directory(
        &self,
        class_dir: &Path,
        assignment_dir: &Path,
        ctx: &BatchContext,
    ) -> ProcessOutcome {
        let audit = AuditLogger::new(
            &ctx.user,
            &ctx.tenant,
            "directory_scan",
            &self.config.audit_log_file,
        );
        audit.operation_start(&assignment_dir.to_string_lossy());
        let mut tracker = ProgressTracker::start(self.progress_store.clone(), &ctx.tracking_id);

        match self.run_directory_scan(class_dir, assignment_dir, &audit, &mut tracker) {
            Ok(outcome) => {
                tracker.complete(outcome.statistics);
                audit.operation_end(
                    outcome.success,
                    &format!(
                        "成功 {}/{}, 失败 {}, 跳过 {}",
                        outcome.statistics.success,
                        outcome.statistics.total,
                        outcome.statistics.failed,
                        outcome.statistics.skipped
                    ),
                );
                outcome
            }
            Err(e) => {
                let message = e.to_string();
                warn!("❌ 目录扫描批处理终止: {}", message);
                tracker.fail(&message);
                audit.operation_end(false, &message);
                ProcessOutcome::aborted(message)
            }
        }
    }

    /// 班级扫描场景：多次作业的成绩表格
    pub async fn process_class_directory(
        &self,
        class_dir: &Path,
        ctx: &BatchContext,
    ) -> ProcessOutcome {
        let audit = AuditLogger::new(
            &ctx.user,
            &ctx.tenant,
            "class_scan",
            &self.config.audit_log_file,
        );
        audit.operation_start(&class_dir.to_string_lossy());
        let mut tracker = ProgressTracker::start(self.progress_store.clone(), &ctx.tracking_id);

        match self.run_class_scan(class_dir, &audit, &mut tracker) {
            Ok(outcome) => {
                tracker.complete(outcome.statistics);
                audit.operation_end(
                    outcome.success,
                    &format!(
                        "成功 {}/{}, 失败 {}, 跳过 {}",
                        outcome.statistics.success,
                        outcome.statistics.total,
                        outcome.statistics.failed,
                        outcome.statistics.skipped
                    ),
                );
                outcome
            }
            Err(e) => {
                let message = e.to_string();
                warn!("❌ 班级扫描批处理终止: {}", message);
                tracker.fail(&message);
                audit.operation_end(false, &message);
                ProcessOutcome::aborted(message)
            }
        }
    }

    // ========== 目录扫描 ==========

    fn run_directory_scan(
        &self,
        class_dir: &Path,
        assignment_dir: &Path,
        audit: &AuditLogger,
        tracker: &mut ProgressTracker,
    ) -> AppResult<ProcessOutcome> {
        // 前置条件：目录存在、作业序号可解析、登记册通过安全校验
        if !assignment_dir.is_dir() {
            return Err(AppError::Business(BusinessError::DirectoryNotFound {
                path: assignment_dir.to_string_lossy().into_owned(),
            }));
        }
        let dir_name = assignment_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let assignment_number = self.resolver.resolve(&dir_name).ok_or_else(|| {
            AppError::Business(BusinessError::AssignmentNumberUnresolved {
                name: dir_name.clone(),
            })
        })?;

        let registry_path = class_dir.join(&self.config.registry_file_name);
        self.validate_registry(&registry_path, audit)?;

        let files = collect_docx_files(assignment_dir);
        if files.is_empty() {
            return Err(AppError::Business(BusinessError::NoEligibleFiles {
                path: assignment_dir.to_string_lossy().into_owned(),
            }));
        }

        log_batch_start("目录扫描", &dir_name, files.len());

        // 加锁 -> 验证 -> 备份，然后才允许写入
        let mut manager = RegistryManager::new(&registry_path, self.config.header_scan_rows);
        manager.load()?;
        if let Err(e) = manager.validate_format() {
            manager.release();
            return Err(e);
        }
        if let Err(e) = manager.create_backup() {
            manager.release();
            return Err(e);
        }
        let column = match manager.find_or_create_assignment_column(assignment_number) {
            Ok(column) => column,
            Err(e) => {
                manager.release();
                return Err(e);
            }
        };

        let mut stats = BatchStatistics {
            total: files.len(),
            ..Default::default()
        };
        let mut file_results = Vec::with_capacity(files.len());
        tracker.update_total(files.len());

        for (index, file) in files.iter().enumerate() {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!("[文件 {}/{}] 处理 {}", index + 1, files.len(), file_name);

            let result = self.process_submission_file(&mut manager, file, &file_name, column, audit);
            match result {
                Ok(outcome) => {
                    if outcome.success {
                        stats.success += 1;
                    } else if outcome.skipped {
                        stats.skipped += 1;
                    } else {
                        stats.failed += 1;
                    }
                    if let Some(message) = outcome.message.as_deref() {
                        warn!("⚠️ {}: {}", file_name, logging::truncate_text(message, 120));
                    }
                    audit.file_outcome(&file_name, outcome.success, outcome.message.as_deref());
                    file_results.push(outcome);
                }
                // 登记册变更失败：恢复备份，终止整个批
                Err(e) => {
                    let _ = manager.restore_from_backup();
                    return Err(e);
                }
            }

            tracker.update_progress(
                index + 1,
                stats.success,
                stats.failed,
                stats.skipped,
                &file_name,
            );
        }

        if let Err(e) = manager.save() {
            let _ = manager.restore_from_backup();
            return Err(e);
        }

        log_batch_complete("目录扫描", &stats);
        Ok(ProcessOutcome {
            success: true,
            statistics: stats,
            file_results,
            error: None,
        })
    }

    /// 处理单个 Word 提交文件
    ///
    /// 返回 Ok(文件结果) 表示批处理继续（成功与否都记入统计）；
    /// 返回 Err 表示登记册层面的变更失败，调用方必须回滚整个批。
    fn process_submission_file(
        &self,
        manager: &mut RegistryManager,
        file: &Path,
        file_name: &str,
        column: u32,
        audit: &AuditLogger,
    ) -> AppResult<FileOutcome> {
        // 格式锁定的文件不得尝试提取成绩，作为跳过上报
        if self.validator.is_format_locked(file) {
            let message = crate::error::ValidationError::FormatLocked {
                path: file_name.to_string(),
            }
            .to_string();
            audit.validation_failure(&file.to_string_lossy(), &message);
            return Ok(FileOutcome::skipped(file_name, message));
        }
        if let Err(e) = self.validator.validate_submission(file) {
            let message = e.to_string();
            audit.validation_failure(&file.to_string_lossy(), &message);
            return Ok(FileOutcome::failed(file_name, message));
        }

        let grade = match self.extractor.extract_from_docx(file) {
            Some(grade) => grade,
            None => {
                let message = crate::error::ExtractError::NoGradeFound {
                    path: file_name.to_string(),
                }
                .to_string();
                return Ok(FileOutcome::failed(file_name, message));
            }
        };

        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let matched = self.match_student(&stem, manager.roster(), true);
        let student = match matched {
            Ok(student) => student,
            Err(message) => return Ok(FileOutcome::failed(file_name, message)),
        };

        let row = match manager.find_row(&student) {
            Some(row) => row,
            None => {
                let message = BusinessError::StudentNotFound {
                    name: student.clone(),
                }
                .to_string();
                return Ok(FileOutcome::failed(file_name, message));
            }
        };

        let outcome = manager.write_grade(row, column, grade.as_str())?;
        let record = GradeRecord {
            student_name: student.clone(),
            grade,
            old_value: outcome.old_value,
        };
        audit.grade_write(&record, column);
        if outcome.written {
            info!("✓ {} -> {} (行 {} 列 {})", student, grade, row, column);
        } else {
            info!("✓ {} 成绩已是 {}，跳过写入", student, grade);
        }
        Ok(FileOutcome::ok(file_name))
    }

    // ========== 班级扫描 ==========

    fn run_class_scan(
        &self,
        class_dir: &Path,
        audit: &AuditLogger,
        tracker: &mut ProgressTracker,
    ) -> AppResult<ProcessOutcome> {
        if !class_dir.is_dir() {
            return Err(AppError::Business(BusinessError::DirectoryNotFound {
                path: class_dir.to_string_lossy().into_owned(),
            }));
        }
        let registry_path = class_dir.join(&self.config.registry_file_name);
        self.validate_registry(&registry_path, audit)?;

        let files = self.collect_grade_sheets(class_dir, &registry_path);
        if files.is_empty() {
            return Err(AppError::Business(BusinessError::NoEligibleFiles {
                path: class_dir.to_string_lossy().into_owned(),
            }));
        }

        log_batch_start("班级扫描", &class_dir.to_string_lossy(), files.len());

        let mut manager = RegistryManager::new(&registry_path, self.config.header_scan_rows);
        manager.load()?;
        if let Err(e) = manager.validate_format() {
            manager.release();
            return Err(e);
        }
        if let Err(e) = manager.create_backup() {
            manager.release();
            return Err(e);
        }

        let mut stats = BatchStatistics {
            total: files.len(),
            ..Default::default()
        };
        let mut file_results = Vec::with_capacity(files.len());
        tracker.update_total(files.len());

        for (index, (file, assignment_number)) in files.iter().enumerate() {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!("[文件 {}/{}] 处理 {}", index + 1, files.len(), file_name);

            let result =
                self.process_grade_sheet(&mut manager, file, &file_name, *assignment_number, audit);
            match result {
                Ok(outcome) => {
                    if outcome.success {
                        stats.success += 1;
                    } else {
                        stats.failed += 1;
                    }
                    if let Some(message) = outcome.message.as_deref() {
                        warn!("⚠️ {}: {}", file_name, logging::truncate_text(message, 120));
                    }
                    audit.file_outcome(&file_name, outcome.success, outcome.message.as_deref());
                    file_results.push(outcome);
                }
                Err(e) => {
                    let _ = manager.restore_from_backup();
                    return Err(e);
                }
            }

            tracker.update_progress(
                index + 1,
                stats.success,
                stats.failed,
                stats.skipped,
                &file_name,
            );
        }

        if let Err(e) = manager.save() {
            let _ = manager.restore_from_backup();
            return Err(e);
        }

        log_batch_complete("班级扫描", &stats);
        Ok(ProcessOutcome {
            success: true,
            statistics: stats,
            file_results,
            error: None,
        })
    }

    /// 处理单个成绩表格文件（一个文件 = 一次作业的全班名单）
    ///
    /// 文件级结果：全部行成功为成功，部分行成功为 partial_success，
    /// 没有任何行成功为失败。
    fn process_grade_sheet(
        &self,
        manager: &mut RegistryManager,
        file: &Path,
        file_name: &str,
        assignment_number: u32,
        audit: &AuditLogger,
    ) -> AppResult<FileOutcome> {
        if let Err(e) = self.validator.validate_spreadsheet(file) {
            let message = e.to_string();
            audit.validation_failure(&file.to_string_lossy(), &message);
            return Ok(FileOutcome::failed(file_name, message));
        }

        let roster_pairs = match self.extractor.extract_from_xlsx(file) {
            None => {
                let message = crate::error::ExtractError::NoHeaderFound {
                    path: file_name.to_string(),
                }
                .to_string();
                return Ok(FileOutcome::failed(file_name, message));
            }
            Some(pairs) if pairs.is_empty() => {
                let message = crate::error::ExtractError::NoUsableRows {
                    path: file_name.to_string(),
                }
                .to_string();
                return Ok(FileOutcome::failed(file_name, message));
            }
            Some(pairs) => pairs,
        };

        let column = manager.find_or_create_assignment_column(assignment_number)?;

        let mut processed = 0usize;
        let mut failed = 0usize;
        let mut messages: Vec<String> = Vec::new();
        for (name, grade) in &roster_pairs {
            // 表格场景不启用文件名兜底匹配
            match self.match_student(name, manager.roster(), false) {
                Ok(student) => {
                    let row = match manager.find_row(&student) {
                        Some(row) => row,
                        None => {
                            failed += 1;
                            messages.push(
                                BusinessError::StudentNotFound {
                                    name: student.clone(),
                                }
                                .to_string(),
                            );
                            continue;
                        }
                    };
                    let outcome = manager.write_grade(row, column, grade.as_str())?;
                    let record = GradeRecord {
                        student_name: student,
                        grade: *grade,
                        old_value: outcome.old_value,
                    };
                    audit.grade_write(&record, column);
                    processed += 1;
                }
                Err(message) => {
                    failed += 1;
                    messages.push(message);
                }
            }
        }

        Ok(FileOutcome {
            file_name: file_name.to_string(),
            success: failed == 0 && processed > 0,
            partial_success: processed > 0 && failed > 0,
            skipped: false,
            students_processed: processed,
            students_failed: failed,
            message: if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            },
        })
    }

    // ========== 公共辅助 ==========

    /// 登记册自身的安全校验（失败则整个批在变更前终止）
    fn validate_registry(&self, registry_path: &Path, audit: &AuditLogger) -> AppResult<()> {
        if !registry_path.is_file() {
            return Err(AppError::Registry(
                crate::error::RegistryError::NotFound {
                    path: registry_path.to_string_lossy().into_owned(),
                },
            ));
        }
        self.validator
            .validate_spreadsheet(registry_path)
            .map_err(|e| {
                audit.validation_failure(&registry_path.to_string_lossy(), &e.to_string());
                e
            })
    }

    /// 匹配学生姓名，歧义和未命中都转成人类可读的失败原因
    fn match_student(
        &self,
        candidate: &str,
        roster: &[String],
        filename_fallback: bool,
    ) -> Result<String, String> {
        let ambiguous = || {
            BusinessError::AmbiguousStudent {
                name: candidate.to_string(),
            }
            .to_string()
        };
        let not_found = || {
            BusinessError::StudentNotFound {
                name: candidate.to_string(),
            }
            .to_string()
        };
        let (matched, kind) = self.matcher.match_name(candidate, roster);
        match (matched, kind) {
            (Some(student), _) => Ok(student),
            (None, MatchKind::Multiple) => Err(ambiguous()),
            (None, _) if filename_fallback => {
                let (matched, kind) = self.matcher.match_by_filename(candidate, roster);
                match (matched, kind) {
                    (Some(student), _) => Ok(student),
                    (None, MatchKind::Multiple) => Err(ambiguous()),
                    (None, _) => Err(not_found()),
                }
            }
            (None, _) => Err(not_found()),
        }
    }

    /// 枚举班级目录下可解析出作业序号的成绩表格
    fn collect_grade_sheets(
        &self,
        class_dir: &Path,
        registry_path: &Path,
    ) -> Vec<(PathBuf, u32)> {
        let mut files: Vec<(PathBuf, u32)> = std::fs::read_dir(class_dir)
            .into_iter()
            .flatten()
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p != registry_path)
            .filter(|p| {
                p.extension()
                    .map(|e| e.eq_ignore_ascii_case("xlsx"))
                    .unwrap_or(false)
            })
            .filter(|p| {
                let name = p
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                !name.starts_with("~$") && !name.contains(".backup.")
            })
            .filter_map(|p| {
                let name = p
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.resolver.resolve(&name).map(|n| (p, n))
            })
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        files
    }
}

/// 递归枚举作业目录下的 Word 提交文件，跳过临时/锁文件
fn collect_docx_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map(|e| e.eq_ignore_ascii_case("docx"))
                .unwrap_or(false)
        })
        .filter(|p| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            !name.starts_with("~$") && !name.contains(".lock")
        })
        .collect();
    files.sort();
    files
}

// ========== 日志辅助函数 ==========

fn log_batch_start(scenario: &str, target: &str, total: usize) {
    info!("{}", "=".repeat(60));
    info!("📦 开始{}批处理: {}", scenario, target);
    info!("📄 共 {} 个文件", total);
    info!("{}", "=".repeat(60));
}

fn log_batch_complete(scenario: &str, stats: &BatchStatistics) {
    info!("{}", "─".repeat(60));
    info!(
        "✓ {}完成: 成功 {}/{}, 失败 {}, 跳过 {}",
        scenario, stats.success, stats.total, stats.failed, stats.skipped
    );
    info!("{}", "─".repeat(60));
}
