//! 作业序号解析服务
//!
//! 从目录名或文件名中解析作业的整数序号，
//! 接受阿拉伯数字（"作业3"）或中文数字（"第二十三次作业"）。
//! 解析不到时返回 None，永远不报错。

use regex::Regex;

/// 按顺序尝试的命名模式，第一个命中的生效
const PATTERNS: &[&str] = &[
    r"作业\s*([0-9]+|[零一二两三四五六七八九十百]+)",
    r"实验\s*([0-9]+|[零一二两三四五六七八九十百]+)",
    r"第\s*([0-9]+|[零一二两三四五六七八九十百]+)\s*次",
    r"(?i)assignment\s*([0-9]+)",
    r"(?i)lab\s*([0-9]+)",
];

/// 作业序号解析服务
pub struct AssignmentNumberResolver {
    patterns: Vec<Regex>,
}

impl AssignmentNumberResolver {
    pub fn new() -> Self {
        Self {
            patterns: PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }

    /// 从名称解析作业序号
    ///
    /// # 参数
    /// - `name`: 目录名或文件名（可含扩展名）
    ///
    /// # 返回
    /// 第一个命中模式的正整数序号，解析不到时返回 None
    pub fn resolve(&self, name: &str) -> Option<u32> {
        for pattern in &self.patterns {
            if let Some(caps) = pattern.captures(name) {
                let token = caps.get(1)?.as_str();
                let number = if token.chars().all(|c| c.is_ascii_digit()) {
                    token.parse::<u32>().ok()
                } else {
                    parse_chinese_numeral(token)
                };
                match number {
                    Some(n) if n > 0 => return Some(n),
                    // 命中了模式但数字解析不出来，继续尝试后面的模式
                    _ => continue,
                }
            }
        }
        None
    }
}

impl Default for AssignmentNumberResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// 中文数字转换（个位、十位乘法规则、百位）
///
/// 规则：数字在"十/百"之前表示乘数（二十三 = 23），
/// 没有乘数时按 1 计（十二 = 12，一百 = 100）。
fn parse_chinese_numeral(s: &str) -> Option<u32> {
    let mut result: u32 = 0;
    let mut current: u32 = 0;

    for c in s.chars() {
        match c {
            '零' => {}
            '一' => current = 1,
            '二' | '两' => current = 2,
            '三' => current = 3,
            '四' => current = 4,
            '五' => current = 5,
            '六' => current = 6,
            '七' => current = 7,
            '八' => current = 8,
            '九' => current = 9,
            '十' => {
                let multiplier = if current == 0 { 1 } else { current };
                result += multiplier * 10;
                current = 0;
            }
            '百' => {
                let multiplier = if current == 0 { 1 } else { current };
                result += multiplier * 100;
                current = 0;
            }
            _ => return None,
        }
    }

    result += current;
    if result > 0 {
        Some(result)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arabic_digits() {
        let resolver = AssignmentNumberResolver::new();
        assert_eq!(resolver.resolve("作业3"), Some(3));
        assert_eq!(resolver.resolve("实验 12"), Some(12));
        assert_eq!(resolver.resolve("Assignment 7"), Some(7));
        assert_eq!(resolver.resolve("lab2"), Some(2));
    }

    #[test]
    fn test_chinese_numerals() {
        let resolver = AssignmentNumberResolver::new();
        assert_eq!(resolver.resolve("作业三"), Some(3));
        assert_eq!(resolver.resolve("第十二次作业"), Some(12));
        assert_eq!(resolver.resolve("第二十三次"), Some(23));
        assert_eq!(resolver.resolve("作业两"), Some(2));
    }

    #[test]
    fn test_numeral_conversion_table() {
        assert_eq!(parse_chinese_numeral("一"), Some(1));
        assert_eq!(parse_chinese_numeral("九"), Some(9));
        assert_eq!(parse_chinese_numeral("十"), Some(10));
        assert_eq!(parse_chinese_numeral("十二"), Some(12));
        assert_eq!(parse_chinese_numeral("二十"), Some(20));
        assert_eq!(parse_chinese_numeral("二十三"), Some(23));
        assert_eq!(parse_chinese_numeral("一百"), Some(100));
        assert_eq!(parse_chinese_numeral("一百零五"), Some(105));
        assert_eq!(parse_chinese_numeral("零"), None);
        assert_eq!(parse_chinese_numeral("甲"), None);
    }

    #[test]
    fn test_unresolved() {
        let resolver = AssignmentNumberResolver::new();
        assert_eq!(resolver.resolve("期末总结"), None);
        assert_eq!(resolver.resolve(""), None);
        assert_eq!(resolver.resolve("作业"), None);
    }

    #[test]
    fn test_pattern_order_first_match_wins() {
        let resolver = AssignmentNumberResolver::new();
        // "作业" 模式排在 "第…次" 之前
        assert_eq!(resolver.resolve("第1次课 作业2"), Some(2));
    }
}
