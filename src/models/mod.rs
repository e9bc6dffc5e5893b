//! 数据模型
//!
//! 定义成绩、匹配结果、批处理统计等核心类型。
//! 所有写入登记册的值都必须先通过 [`Grade::parse`] 校验，
//! 自由文本永远不会进入登记册单元格。

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 字母等级成绩
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    E,
}

/// 文字等级成绩
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextGrade {
    /// 优秀
    Excellent,
    /// 良好
    Good,
    /// 中等
    Fair,
    /// 及格
    Pass,
    /// 不及格
    Fail,
}

/// 成绩值
///
/// 固定词表：字母等级 A-E，或文字等级（优秀/良好/中等/及格/不及格）。
/// 解析时容忍两类别名：小写字母（a-e）和文字等级的单字简写
/// （优/良/中），都归一到标准记号；写入登记册的永远是 [`Grade::as_str`]
/// 的标准形式。词表之外的内容一律视为"没有成绩"，而不是错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    Letter(LetterGrade),
    Text(TextGrade),
}

impl Grade {
    /// 从字符串解析成绩（固定词表加受容忍的别名，见类型文档）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "A" | "a" => Some(Grade::Letter(LetterGrade::A)),
            "B" | "b" => Some(Grade::Letter(LetterGrade::B)),
            "C" | "c" => Some(Grade::Letter(LetterGrade::C)),
            "D" | "d" => Some(Grade::Letter(LetterGrade::D)),
            "E" | "e" => Some(Grade::Letter(LetterGrade::E)),
            "优秀" | "优" => Some(Grade::Text(TextGrade::Excellent)),
            "良好" | "良" => Some(Grade::Text(TextGrade::Good)),
            "中等" | "中" => Some(Grade::Text(TextGrade::Fair)),
            "及格" => Some(Grade::Text(TextGrade::Pass)),
            "不及格" => Some(Grade::Text(TextGrade::Fail)),
            _ => None,
        }
    }

    /// 写入登记册的标准记号
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::Letter(LetterGrade::A) => "A",
            Grade::Letter(LetterGrade::B) => "B",
            Grade::Letter(LetterGrade::C) => "C",
            Grade::Letter(LetterGrade::D) => "D",
            Grade::Letter(LetterGrade::E) => "E",
            Grade::Text(TextGrade::Excellent) => "优秀",
            Grade::Text(TextGrade::Good) => "良好",
            Grade::Text(TextGrade::Fair) => "中等",
            Grade::Text(TextGrade::Pass) => "及格",
            Grade::Text(TextGrade::Fail) => "不及格",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次成绩写入的临时记录
///
/// 只在单个文件/行的处理过程中存活，唯一的持久痕迹
/// 是登记册单元格的值和审计日志里的一行。
#[derive(Debug, Clone)]
pub struct GradeRecord {
    pub student_name: String,
    pub grade: Grade,
    /// 被覆盖前的旧值（首次写入时为 None）
    pub old_value: Option<String>,
}

/// 姓名匹配的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    /// 精确匹配
    Exact,
    /// 归一化后的模糊匹配
    Fuzzy,
    /// 文件名包含匹配
    Filename,
    /// 多个候选（歧义，视为失败）
    Multiple,
    /// 未匹配
    None,
}

/// 批处理统计
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// 单个文件的处理结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file_name: String,
    pub success: bool,
    /// 表格文件：部分行成功、部分行失败
    pub partial_success: bool,
    /// 文件按规则被跳过（如格式锁定），与失败分开计数
    pub skipped: bool,
    pub students_processed: usize,
    pub students_failed: usize,
    /// 人类可读的失败/跳过原因
    pub message: Option<String>,
}

impl FileOutcome {
    pub fn ok(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            success: true,
            partial_success: false,
            skipped: false,
            students_processed: 1,
            students_failed: 0,
            message: None,
        }
    }

    pub fn failed(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            success: false,
            partial_success: false,
            skipped: false,
            students_processed: 0,
            students_failed: 1,
            message: Some(message.into()),
        }
    }

    pub fn skipped(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            success: false,
            partial_success: false,
            skipped: true,
            students_processed: 0,
            students_failed: 0,
            message: Some(message.into()),
        }
    }
}

/// 一次批处理调用对外暴露的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub success: bool,
    pub statistics: BatchStatistics,
    pub file_results: Vec<FileOutcome>,
    /// 批级别的终止错误（前置条件/安全/锁失败）
    pub error: Option<String>,
}

impl ProcessOutcome {
    /// 批在任何变更发生前即告终止
    pub fn aborted(error: impl Into<String>) -> Self {
        Self {
            success: false,
            statistics: BatchStatistics::default(),
            file_results: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// 批处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Running,
    Completed,
    Failed,
}

/// 进度快照
///
/// 整体替换写入（不做字段级更新），外部轮询方只会看到
/// 最近一次完整写入的快照。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressState {
    pub status: ProgressStatus,
    pub total: usize,
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub current_file: Option<String>,
    pub message: Option<String>,
    pub updated_at: DateTime<Local>,
}

impl ProgressState {
    pub fn started() -> Self {
        Self {
            status: ProgressStatus::Running,
            total: 0,
            processed: 0,
            success: 0,
            failed: 0,
            skipped: 0,
            current_file: None,
            message: None,
            updated_at: Local::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_vocabulary() {
        assert_eq!(Grade::parse("A"), Some(Grade::Letter(LetterGrade::A)));
        assert_eq!(Grade::parse(" b "), Some(Grade::Letter(LetterGrade::B)));
        assert_eq!(Grade::parse("优秀"), Some(Grade::Text(TextGrade::Excellent)));
        // 容忍的别名归一到标准记号
        assert_eq!(Grade::parse("优").unwrap().as_str(), "优秀");
        assert_eq!(Grade::parse("e").unwrap().as_str(), "E");
        assert_eq!(Grade::parse("不及格"), Some(Grade::Text(TextGrade::Fail)));
        // 词表之外：不是错误，而是"没有成绩"
        assert_eq!(Grade::parse("F"), None);
        assert_eq!(Grade::parse("90"), None);
        assert_eq!(Grade::parse(""), None);
        assert_eq!(Grade::parse("很棒"), None);
    }

    #[test]
    fn test_grade_round_trip_token() {
        for token in ["A", "B", "C", "D", "E", "优秀", "良好", "中等", "及格", "不及格"] {
            let grade = Grade::parse(token).unwrap();
            assert_eq!(grade.as_str(), token);
        }
    }
}
