//! 登记册管理器
//!
//! 唯一持有登记册工作簿的模块，对外只暴露能力：
//! 加锁加载、格式验证、定位/创建作业列、写单元格、
//! 备份/保存/恢复。
//!
//! 状态机：`Unloaded -> Locked -> Validated -> (Mutated)* ->
//! Saved | RolledBack`。锁在 save、restore、显式释放或析构时
//! 释放，任何退出路径都不会把登记册留在锁定状态。

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use umya_spreadsheet::Spreadsheet;

use crate::error::{AppError, AppResult, RegistryError};
use crate::registry::backup::RegistryTransaction;
use crate::registry::lock::{LockError, LockHandle, RegistryLock};

/// 姓名列表头的候选词
const NAME_HEADERS: &[&str] = &["姓名", "名字"];

/// 管理器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManagerState {
    Unloaded,
    Locked,
    Validated,
    Mutated,
    Saved,
    RolledBack,
}

impl ManagerState {
    fn name(self) -> &'static str {
        match self {
            ManagerState::Unloaded => "Unloaded",
            ManagerState::Locked => "Locked",
            ManagerState::Validated => "Validated",
            ManagerState::Mutated => "Mutated",
            ManagerState::Saved => "Saved",
            ManagerState::RolledBack => "RolledBack",
        }
    }
}

/// 一次单元格写入的结果
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// false 表示单元格已经是目标值，没有发生写入（幂等保证）
    pub written: bool,
    /// 写入前的旧值（空单元格为 None），用于审计
    pub old_value: Option<String>,
}

/// 登记册管理器
pub struct RegistryManager {
    path: PathBuf,
    header_scan_rows: u32,
    state: ManagerState,
    book: Option<Spreadsheet>,
    lock: Option<LockHandle>,
    transaction: RegistryTransaction,
    header_row: u32,
    name_column: u32,
    /// 姓名 -> 行号，姓名原样保存（归一化只发生在匹配器里）
    student_index: HashMap<String, u32>,
    /// 出现在多行上的同名姓名，按名定位时必须拒绝
    duplicate_names: HashSet<String>,
    roster: Vec<String>,
}

impl RegistryManager {
    pub fn new(path: &Path, header_scan_rows: u32) -> Self {
        Self {
            path: path.to_path_buf(),
            header_scan_rows,
            state: ManagerState::Unloaded,
            book: None,
            lock: None,
            transaction: RegistryTransaction::new(path),
            header_row: 0,
            name_column: 0,
            student_index: HashMap::new(),
            duplicate_names: HashSet::new(),
            roster: Vec::new(),
        }
    }

    /// 加锁并打开登记册
    ///
    /// 锁定检查做两次：先探测一次（已被占用时快速失败），
    /// 再实际获取。获取是非阻塞的。
    pub fn load(&mut self) -> AppResult<()> {
        self.expect_state(ManagerState::Unloaded, "Unloaded")?;

        if !self.path.exists() {
            return Err(AppError::Registry(RegistryError::NotFound {
                path: self.path_string(),
            }));
        }
        if RegistryLock::is_locked(&self.path) {
            return Err(AppError::Registry(RegistryError::LockUnavailable {
                path: self.path_string(),
            }));
        }
        let handle = RegistryLock::try_acquire(&self.path).map_err(|e| match e {
            LockError::Busy { path } => {
                AppError::Registry(RegistryError::LockUnavailable { path })
            }
            LockError::Io { path, source } => AppError::registry_load_failed(path, source),
        })?;

        let book = umya_spreadsheet::reader::xlsx::read(&self.path)
            .map_err(|e| AppError::registry_load_failed(self.path_string(), e))?;

        self.book = Some(book);
        self.lock = Some(handle);
        self.state = ManagerState::Locked;
        debug!("登记册已加载并锁定: {}", self.path.display());
        Ok(())
    }

    /// 扫描表头并建立学生索引
    ///
    /// 在前 `header_scan_rows` 行里找包含"姓名"的单元格；
    /// 找不到时报 MissingNameColumn（不回退猜测表头位置）。
    pub fn validate_format(&mut self) -> AppResult<()> {
        self.expect_state(ManagerState::Locked, "Locked")?;

        let path = self.path_string();
        let scan_rows = self.header_scan_rows;
        let sheet = self.sheet()?;
        let highest_row = sheet.get_highest_row();
        let highest_col = sheet.get_highest_column();

        let mut header: Option<(u32, u32)> = None;
        'scan: for row in 1..=scan_rows.min(highest_row) {
            for col in 1..=highest_col {
                let value = sheet.get_value((col, row));
                if NAME_HEADERS.iter().any(|h| value.contains(h)) {
                    header = Some((row, col));
                    break 'scan;
                }
            }
        }
        let (header_row, name_column) = header.ok_or(AppError::Registry(
            RegistryError::MissingNameColumn { path },
        ))?;

        let mut student_index: HashMap<String, u32> = HashMap::new();
        let mut duplicate_names: HashSet<String> = HashSet::new();
        let mut roster = Vec::new();
        for row in (header_row + 1)..=highest_row {
            let name = sheet.get_value((name_column, row)).trim().to_string();
            if name.is_empty() {
                continue;
            }
            // 同名出现在多行：两行都无法按名定位，只能人工处理
            if student_index.contains_key(&name) {
                duplicate_names.insert(name.clone());
            } else {
                student_index.insert(name.clone(), row);
            }
            roster.push(name);
        }
        for name in &duplicate_names {
            warn!("登记册中存在同名学生，按名写入将被拒绝: {}", name);
        }

        self.header_row = header_row;
        self.name_column = name_column;
        self.student_index = student_index;
        self.duplicate_names = duplicate_names;
        self.roster = roster;
        self.state = ManagerState::Validated;
        info!(
            "登记册格式有效: 表头第 {} 行, 姓名列第 {} 列, 共 {} 名学生",
            header_row,
            name_column,
            self.student_index.len()
        );
        Ok(())
    }

    /// 学生名单（登记册原样）
    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// 按姓名（原样）定位学生所在行
    ///
    /// 同名学生占多行时返回 None，绝不在多行之间猜测。
    pub fn find_row(&self, name: &str) -> Option<u32> {
        if self.duplicate_names.contains(name) {
            return None;
        }
        self.student_index.get(name).copied()
    }

    pub fn name_column(&self) -> u32 {
        self.name_column
    }

    pub fn header_row(&self) -> u32 {
        self.header_row
    }

    /// 定位（必要时创建）作业列
    ///
    /// 列号 = 姓名列 + 作业序号，纯算术、幂等；
    /// 只保证单元格存在，不要求有表头标签。
    pub fn find_or_create_assignment_column(&mut self, assignment_number: u32) -> AppResult<u32> {
        self.expect_validated()?;
        let column = self.name_column + assignment_number;
        let header_row = self.header_row;
        let sheet = self.sheet_mut()?;
        sheet.get_cell_mut((column, header_row));
        Ok(column)
    }

    /// 在第一次写入之前创建备份
    pub fn create_backup(&mut self) -> AppResult<()> {
        self.expect_validated()?;
        self.transaction.begin()
    }

    /// 写入成绩单元格
    ///
    /// 单元格已经等于目标值时不做任何写入（written = false），
    /// 重复执行同一批任务不会碰文件；否则覆盖并返回旧值供审计。
    pub fn write_grade(&mut self, row: u32, column: u32, value: &str) -> AppResult<WriteOutcome> {
        self.expect_validated()?;

        let old = {
            let sheet = self.sheet()?;
            sheet.get_value((column, row))
        };
        let old_value = if old.trim().is_empty() {
            None
        } else {
            Some(old.clone())
        };

        if old == value {
            return Ok(WriteOutcome {
                written: false,
                old_value,
            });
        }

        if !self.transaction.active() {
            return Err(AppError::Registry(RegistryError::InvalidState {
                expected: "已备份",
                actual: "未备份",
            }));
        }

        let sheet = self.sheet_mut()?;
        sheet.get_cell_mut((column, row)).set_value(value);
        self.state = ManagerState::Mutated;
        debug!("写入成绩: 行 {} 列 {} <- {} (旧值: {:?})", row, column, value, old_value);
        Ok(WriteOutcome {
            written: true,
            old_value,
        })
    }

    /// 保存登记册，删除备份并释放锁
    pub fn save(&mut self) -> AppResult<()> {
        self.expect_validated()?;
        let book = self.book.as_ref().ok_or(AppError::Registry(
            RegistryError::InvalidState {
                expected: "已加载",
                actual: "未加载",
            },
        ))?;
        umya_spreadsheet::writer::xlsx::write(book, &self.path)
            .map_err(|e| AppError::registry_save_failed(self.path_string(), e))?;
        self.transaction.commit()?;
        self.release_lock();
        self.state = ManagerState::Saved;
        info!("登记册已保存: {}", self.path.display());
        Ok(())
    }

    /// 从备份恢复登记册并释放锁
    ///
    /// 第一次变更之后任何一步失败都走这里，调用方看到的
    /// 登记册永远不会停在写了一半的状态。
    pub fn restore_from_backup(&mut self) -> AppResult<()> {
        let result = self.transaction.rollback();
        self.release_lock();
        self.state = ManagerState::RolledBack;
        result
    }

    /// 放弃本次批处理（未发生变更时），只释放锁
    pub fn release(&mut self) {
        self.release_lock();
    }

    fn release_lock(&mut self) {
        if let Some(handle) = self.lock.take() {
            handle.release();
        }
    }

    fn sheet(&self) -> AppResult<&umya_spreadsheet::Worksheet> {
        self.book
            .as_ref()
            .and_then(|b| b.get_sheet(&0))
            .ok_or(AppError::Registry(RegistryError::InvalidState {
                expected: "已加载",
                actual: "未加载",
            }))
    }

    fn sheet_mut(&mut self) -> AppResult<&mut umya_spreadsheet::Worksheet> {
        self.book
            .as_mut()
            .and_then(|b| b.get_sheet_mut(&0))
            .ok_or(AppError::Registry(RegistryError::InvalidState {
                expected: "已加载",
                actual: "未加载",
            }))
    }

    fn expect_state(&self, expected: ManagerState, name: &'static str) -> AppResult<()> {
        if self.state != expected {
            return Err(AppError::Registry(RegistryError::InvalidState {
                expected: name,
                actual: self.state.name(),
            }));
        }
        Ok(())
    }

    fn expect_validated(&self) -> AppResult<()> {
        match self.state {
            ManagerState::Validated | ManagerState::Mutated => Ok(()),
            other => Err(AppError::Registry(RegistryError::InvalidState {
                expected: "Validated",
                actual: other.name(),
            })),
        }
    }

    fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

impl Drop for RegistryManager {
    fn drop(&mut self) {
        self.release_lock();
    }
}
