/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 所有班级目录的根目录，路径校验的边界
    pub base_dir: String,
    /// 登记册文件名（每个班级目录下一份）
    pub registry_file_name: String,
    /// 提交文件大小上限（字节）
    pub max_file_size: u64,
    /// 表格行数上限
    pub max_sheet_rows: u32,
    /// 表格列数上限
    pub max_sheet_cols: u32,
    /// 表头扫描的行数上限
    pub header_scan_rows: u32,
    /// 进度快照的过期时间（秒）
    pub progress_ttl_secs: u64,
    /// 审计日志文件路径
    pub audit_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: "classes".to_string(),
            registry_file_name: "成绩登记册.xlsx".to_string(),
            max_file_size: 20 * 1024 * 1024,
            max_sheet_rows: 10_000,
            max_sheet_cols: 200,
            header_scan_rows: 20,
            progress_ttl_secs: 3600,
            audit_log_file: "audit.log".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            base_dir: std::env::var("GRADE_BASE_DIR").unwrap_or(default.base_dir),
            registry_file_name: std::env::var("GRADE_REGISTRY_FILE_NAME").unwrap_or(default.registry_file_name),
            max_file_size: std::env::var("GRADE_MAX_FILE_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_file_size),
            max_sheet_rows: std::env::var("GRADE_MAX_SHEET_ROWS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_sheet_rows),
            max_sheet_cols: std::env::var("GRADE_MAX_SHEET_COLS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_sheet_cols),
            header_scan_rows: std::env::var("GRADE_HEADER_SCAN_ROWS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.header_scan_rows),
            progress_ttl_secs: std::env::var("GRADE_PROGRESS_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.progress_ttl_secs),
            audit_log_file: std::env::var("GRADE_AUDIT_LOG_FILE").unwrap_or(default.audit_log_file),
            verbose_logging: std::env::var("GRADE_VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }
}
