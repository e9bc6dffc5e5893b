//! 成绩提取服务
//!
//! 负责从提交文件中提取成绩：
//! - Word 文档：先判断是实验报告（表格里有教师签名单元格）还是普通作业，
//!   实验报告在表格单元格里找成绩记号，普通作业从文档末尾倒着找
//!   "教师评分：" 开头的段落
//! - 表格文件：在前若干行找"姓名"和"成绩"表头，然后批量读出名单
//!
//! 只读，不产生任何副作用。任何 IO/解析异常都在本模块内收敛为
//! "没有提取到数据"，单个学生文件损坏绝不能中断整个批处理。

use std::path::Path;

use docx_rs::{
    read_docx, DocumentChild, Paragraph, ParagraphChild, RunChild, Table, TableCellContent,
    TableChild, TableRowChild,
};
use tracing::{debug, warn};

use crate::models::Grade;

/// 教师签名标记（归一化后包含任意一个即视为实验报告）
const SIGNATURE_MARKERS: &[&str] = &["教师签名", "指导教师", "指导老师"];

/// 普通作业中成绩行的前缀（三种固定写法）
const GRADE_LABEL_PREFIXES: &[&str] = &["教师评分：", "教师评分:", "老师评分："];

/// 表格文件中姓名表头的候选词
const NAME_HEADERS: &[&str] = &["姓名", "名字"];

/// 表格文件中成绩表头的候选词
const GRADE_HEADERS: &[&str] = &["成绩", "分数", "等级"];

/// 成绩提取服务
pub struct GradeValueExtractor {
    /// 表头扫描的行数上限
    header_scan_rows: u32,
}

impl GradeValueExtractor {
    pub fn new(header_scan_rows: u32) -> Self {
        Self { header_scan_rows }
    }

    /// 从 Word 文档中提取单个成绩
    ///
    /// # 返回
    /// 识别到的成绩；文件损坏、没有成绩、记号不在词表内时都返回 None
    pub fn extract_from_docx(&self, path: &Path) -> Option<Grade> {
        let buf = match std::fs::read(path) {
            Ok(buf) => buf,
            Err(e) => {
                warn!("读取提交文件失败 ({}): {}", path.display(), e);
                return None;
            }
        };
        let docx = match read_docx(&buf) {
            Ok(docx) => docx,
            Err(e) => {
                warn!("解析 Word 文档失败 ({}): {}", path.display(), e);
                return None;
            }
        };

        let mut paragraphs: Vec<String> = Vec::new();
        let mut table_cells: Vec<String> = Vec::new();
        for child in &docx.document.children {
            match child {
                DocumentChild::Paragraph(p) => paragraphs.push(paragraph_text(p)),
                DocumentChild::Table(t) => collect_table_cells(t, &mut table_cells),
                _ => {}
            }
        }

        if is_lab_report(&table_cells) {
            debug!("{} 识别为实验报告", path.display());
            self.extract_from_table_cells(&table_cells)
        } else {
            self.extract_from_paragraphs(&paragraphs)
        }
    }

    /// 实验报告：在表格单元格里找成绩记号
    fn extract_from_table_cells(&self, cells: &[String]) -> Option<Grade> {
        cells.iter().find_map(|cell| Grade::parse(cell))
    }

    /// 普通作业：从文档末尾倒着找成绩行
    fn extract_from_paragraphs(&self, paragraphs: &[String]) -> Option<Grade> {
        for line in paragraphs.iter().rev() {
            let line = line.trim();
            for prefix in GRADE_LABEL_PREFIXES {
                if let Some(rest) = line.strip_prefix(prefix) {
                    return Grade::parse(rest);
                }
            }
        }
        None
    }

    /// 从表格文件中批量提取 (姓名, 成绩) 名单
    ///
    /// 在前 `header_scan_rows` 行里分别找姓名表头和成绩表头，
    /// 然后读出表头之下的所有数据行，过滤掉空姓名/空成绩和
    /// 词表之外的值。
    ///
    /// # 返回
    /// 文件损坏或找不到表头时返回 None；找到表头但没有可用
    /// 数据行时返回 Some(空列表)，调用方据此区分失败原因
    pub fn extract_from_xlsx(&self, path: &Path) -> Option<Vec<(String, Grade)>> {
        let book = match umya_spreadsheet::reader::xlsx::read(path) {
            Ok(book) => book,
            Err(e) => {
                warn!("打开表格文件失败 ({}): {}", path.display(), e);
                return None;
            }
        };
        let sheet = book.get_sheet(&0)?;

        let highest_row = sheet.get_highest_row();
        let highest_col = sheet.get_highest_column();
        let scan_rows = self.header_scan_rows.min(highest_row);

        let mut name_pos: Option<(u32, u32)> = None;
        let mut grade_pos: Option<(u32, u32)> = None;
        for row in 1..=scan_rows {
            for col in 1..=highest_col {
                let value = sheet.get_value((col, row));
                let value = value.trim();
                if name_pos.is_none() && NAME_HEADERS.iter().any(|h| value.contains(h)) {
                    name_pos = Some((col, row));
                }
                if grade_pos.is_none() && GRADE_HEADERS.iter().any(|h| value.contains(h)) {
                    grade_pos = Some((col, row));
                }
            }
        }

        let ((name_col, name_row), (grade_col, grade_row)) = match (name_pos, grade_pos) {
            (Some(n), Some(g)) => (n, g),
            _ => {
                warn!("表格文件缺少姓名/成绩表头: {}", path.display());
                return None;
            }
        };

        let data_start = name_row.max(grade_row) + 1;
        let mut roster = Vec::new();
        for row in data_start..=highest_row {
            let name = sheet.get_value((name_col, row)).trim().to_string();
            if name.is_empty() {
                continue;
            }
            let raw_grade = sheet.get_value((grade_col, row));
            if raw_grade.trim().is_empty() {
                continue;
            }
            match Grade::parse(&raw_grade) {
                Some(grade) => roster.push((name, grade)),
                None => {
                    debug!("忽略词表之外的成绩值: {} -> {}", name, raw_grade.trim());
                }
            }
        }
        Some(roster)
    }
}

/// 判断是否为实验报告：任一表格单元格归一化后包含教师签名标记
fn is_lab_report(table_cells: &[String]) -> bool {
    table_cells.iter().any(|cell| {
        let normalized = normalize_cell_text(cell);
        SIGNATURE_MARKERS.iter().any(|m| normalized.contains(m))
    })
}

/// 单元格文本归一化：去掉空白，统一全角/半角标点
fn normalize_cell_text(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '：' => ':',
            '（' => '(',
            '）' => ')',
            '，' => ',',
            '。' => '.',
            other => other,
        })
        .collect()
}

/// 拼出一个段落的纯文本
fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let ParagraphChild::Run(run) = child {
            for rc in &run.children {
                if let RunChild::Text(t) = rc {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

/// 收集一个表格里所有单元格的纯文本（按行序）
fn collect_table_cells(table: &Table, out: &mut Vec<String>) {
    for row in &table.rows {
        let TableChild::TableRow(row) = row;
        for cell in &row.cells {
            let TableRowChild::TableCell(cell) = cell;
            let mut text = String::new();
            for content in &cell.children {
                if let TableCellContent::Paragraph(p) = content {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&paragraph_text(p));
                }
            }
            out.push(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lab_report_classification() {
        let cells = vec![
            "实验目的".to_string(),
            "教师 签名：".to_string(),
            "A".to_string(),
        ];
        assert!(is_lab_report(&cells));

        let cells = vec!["姓名".to_string(), "张三".to_string()];
        assert!(!is_lab_report(&cells));
    }

    #[test]
    fn test_grade_from_table_cells() {
        let extractor = GradeValueExtractor::new(20);
        let cells = vec![
            "指导教师：王老师".to_string(),
            "良好".to_string(),
        ];
        assert_eq!(
            extractor.extract_from_table_cells(&cells),
            Some(Grade::parse("良好").unwrap())
        );
    }

    #[test]
    fn test_grade_from_paragraphs_backward_scan() {
        let extractor = GradeValueExtractor::new(20);
        let paragraphs = vec![
            "第三次作业".to_string(),
            "教师评分：C".to_string(),
            "（以上为正文）".to_string(),
            "教师评分：A".to_string(),
        ];
        // 从末尾倒着找，最后一个成绩行生效
        assert_eq!(
            extractor.extract_from_paragraphs(&paragraphs),
            Some(Grade::parse("A").unwrap())
        );
    }

    #[test]
    fn test_unknown_token_is_absent_not_error() {
        let extractor = GradeValueExtractor::new(20);
        let paragraphs = vec!["教师评分：90分".to_string()];
        assert_eq!(extractor.extract_from_paragraphs(&paragraphs), None);
    }

    #[test]
    fn test_no_grade_line() {
        let extractor = GradeValueExtractor::new(20);
        let paragraphs = vec!["正文".to_string(), "总结".to_string()];
        assert_eq!(extractor.extract_from_paragraphs(&paragraphs), None);
    }
}
