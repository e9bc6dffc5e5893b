use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 登记册相关错误
    Registry(RegistryError),
    /// 提取相关错误
    Extract(ExtractError),
    /// 安全校验错误
    Validation(ValidationError),
    /// 业务逻辑错误
    Business(BusinessError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Registry(e) => write!(f, "登记册错误: {}", e),
            AppError::Extract(e) => write!(f, "提取错误: {}", e),
            AppError::Validation(e) => write!(f, "安全校验错误: {}", e),
            AppError::Business(e) => write!(f, "业务错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Registry(e) => Some(e),
            AppError::Extract(e) => Some(e),
            AppError::Validation(e) => Some(e),
            AppError::Business(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 登记册相关错误
#[derive(Debug)]
pub enum RegistryError {
    /// 登记册文件不存在
    NotFound {
        path: String,
    },
    /// 登记册已被其他进程锁定
    LockUnavailable {
        path: String,
    },
    /// 找不到姓名列（前 20 行内没有表头）
    MissingNameColumn {
        path: String,
    },
    /// 打开工作簿失败
    LoadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 保存工作簿失败
    SaveFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 备份操作失败
    BackupFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 状态机顺序错误（如未验证就写入）
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound { path } => write!(f, "登记册文件不存在: {}", path),
            RegistryError::LockUnavailable { path } => {
                write!(f, "登记册已被其他进程锁定: {}", path)
            }
            RegistryError::MissingNameColumn { path } => {
                write!(f, "登记册格式无效，找不到姓名列: {}", path)
            }
            RegistryError::LoadFailed { path, source } => {
                write!(f, "打开登记册失败 ({}): {}", path, source)
            }
            RegistryError::SaveFailed { path, source } => {
                write!(f, "保存登记册失败 ({}): {}", path, source)
            }
            RegistryError::BackupFailed { path, source } => {
                write!(f, "登记册备份操作失败 ({}): {}", path, source)
            }
            RegistryError::InvalidState { expected, actual } => {
                write!(f, "登记册状态错误: 期望 {}，当前 {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::LoadFailed { source, .. }
            | RegistryError::SaveFailed { source, .. }
            | RegistryError::BackupFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 提取相关错误
#[derive(Debug)]
pub enum ExtractError {
    /// 文件中没有可识别的成绩
    NoGradeFound {
        path: String,
    },
    /// 表格文件中没有可识别的表头
    NoHeaderFound {
        path: String,
    },
    /// 表头存在但表头之下没有可用的数据行
    NoUsableRows {
        path: String,
    },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::NoGradeFound { path } => write!(f, "未找到成绩: {}", path),
            ExtractError::NoHeaderFound { path } => write!(f, "未找到姓名/成绩表头: {}", path),
            ExtractError::NoUsableRows { path } => {
                write!(f, "表头之下没有可用的数据行: {}", path)
            }
        }
    }
}

impl std::error::Error for ExtractError {}

/// 安全校验错误
#[derive(Debug)]
pub enum ValidationError {
    /// 路径越出基准目录
    PathOutsideBase {
        path: String,
    },
    /// 路径包含非法序列或非法字符
    IllegalPath {
        path: String,
        reason: String,
    },
    /// 符号链接不允许
    SymlinkRejected {
        path: String,
    },
    /// 文件为空或超出大小上限
    SizeOutOfBounds {
        path: String,
        size: u64,
        max: u64,
    },
    /// 表格结构越界（行/列数超过上限）或容器损坏
    StructureInvalid {
        path: String,
        reason: String,
    },
    /// 提交文件已因格式问题被锁定
    FormatLocked {
        path: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::PathOutsideBase { path } => {
                write!(f, "路径越出基准目录: {}", path)
            }
            ValidationError::IllegalPath { path, reason } => {
                write!(f, "非法路径 ({}): {}", reason, path)
            }
            ValidationError::SymlinkRejected { path } => {
                write!(f, "不允许符号链接: {}", path)
            }
            ValidationError::SizeOutOfBounds { path, size, max } => {
                write!(f, "文件大小越界 ({} 字节, 上限 {} 字节): {}", size, max, path)
            }
            ValidationError::StructureInvalid { path, reason } => {
                write!(f, "表格结构无效 ({}): {}", reason, path)
            }
            ValidationError::FormatLocked { path } => {
                write!(f, "文件已被锁定(locked)，跳过成绩提取: {}", path)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// 业务逻辑错误
#[derive(Debug)]
pub enum BusinessError {
    /// 无法从目录/文件名解析作业序号
    AssignmentNumberUnresolved {
        name: String,
    },
    /// 学生不在登记册名单中
    StudentNotFound {
        name: String,
    },
    /// 多个学生匹配同一姓名（歧义）
    AmbiguousStudent {
        name: String,
    },
    /// 目录不存在
    DirectoryNotFound {
        path: String,
    },
    /// 目录下没有可处理的文件
    NoEligibleFiles {
        path: String,
    },
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusinessError::AssignmentNumberUnresolved { name } => {
                write!(f, "无法从名称解析作业序号: {}", name)
            }
            BusinessError::StudentNotFound { name } => {
                write!(f, "学生不在登记册名单中: {}", name)
            }
            BusinessError::AmbiguousStudent { name } => {
                write!(f, "姓名匹配到多个学生（歧义）: {}", name)
            }
            BusinessError::DirectoryNotFound { path } => write!(f, "目录不存在: {}", path),
            BusinessError::NoEligibleFiles { path } => {
                write!(f, "目录下没有可处理的文件: {}", path)
            }
        }
    }
}

impl std::error::Error for BusinessError {}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(format!("IO错误: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON序列化失败: {}", err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建登记册打开失败错误
    pub fn registry_load_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Registry(RegistryError::LoadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建登记册保存失败错误
    pub fn registry_save_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Registry(RegistryError::SaveFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建备份失败错误
    pub fn backup_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Registry(RegistryError::BackupFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
