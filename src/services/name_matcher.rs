//! 姓名匹配服务
//!
//! 负责把提取出来的学生姓名匹配到登记册名单中的某一行。
//!
//! 匹配按归一化形式进行（去掉空白和固定的分隔符号），唯一命中时
//! 按是否逐字相等标记为精确或模糊；目录扫描场景另有文件名包含
//! 匹配作为兜底，由调用方决定是否启用。
//!
//! 歧义永远作为失败上报（[`MatchKind::Multiple`]），系统绝不在多个
//! 候选之间擅自猜测，名单里完全同名的两行也同样拒绝。

use crate::models::MatchKind;

/// 归一化时去掉的分隔符号（固定集合）
const STRIP_CHARS: &[char] = &[
    '_', '-', '·', '.', '．', '、', '，', ',', '(', ')', '（', '）', '【', '】', '[', ']',
];

/// 姓名匹配服务
pub struct NameMatcher;

impl NameMatcher {
    pub fn new() -> Self {
        Self
    }

    /// 匹配姓名
    ///
    /// 归一化形式发生碰撞的名单条目（包括完全同名）一律视为歧义，
    /// 即使候选姓名与其中一条精确相等也不猜测。
    ///
    /// # 参数
    /// - `candidate`: 从提交文件中提取出来的姓名
    /// - `roster`: 登记册名单（原样保存，未归一化）
    ///
    /// # 返回
    /// 命中的名单姓名（原样）和匹配方式；歧义时返回 `(None, Multiple)`
    pub fn match_name(&self, candidate: &str, roster: &[String]) -> (Option<String>, MatchKind) {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return (None, MatchKind::None);
        }

        let normalized = normalize(candidate);
        if normalized.is_empty() {
            return (None, MatchKind::None);
        }

        let hits: Vec<&String> = roster
            .iter()
            .filter(|n| normalize(n) == normalized)
            .collect();
        match hits.len() {
            0 => (None, MatchKind::None),
            1 if hits[0].as_str() == candidate => (Some(hits[0].clone()), MatchKind::Exact),
            1 => (Some(hits[0].clone()), MatchKind::Fuzzy),
            _ => (None, MatchKind::Multiple),
        }
    }

    /// 文件名包含匹配（兜底）
    ///
    /// 仅在目录扫描场景使用：检查是否恰好有一个名单姓名的归一化形式
    /// 是归一化文件名的子串。
    pub fn match_by_filename(&self, file_name: &str, roster: &[String]) -> (Option<String>, MatchKind) {
        let normalized_file = normalize(file_name);
        if normalized_file.is_empty() {
            return (None, MatchKind::None);
        }

        let hits: Vec<&String> = roster
            .iter()
            .filter(|n| {
                let nn = normalize(n);
                !nn.is_empty() && normalized_file.contains(&nn)
            })
            .collect();

        match hits.len() {
            0 => (None, MatchKind::None),
            1 => (Some(hits[0].clone()), MatchKind::Filename),
            _ => (None, MatchKind::Multiple),
        }
    }
}

impl Default for NameMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// 姓名归一化：去掉所有空白和固定分隔符号
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && !STRIP_CHARS.contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match() {
        let matcher = NameMatcher::new();
        let roster = roster(&["张三", "李四"]);
        let (name, kind) = matcher.match_name("张三", &roster);
        assert_eq!(name.as_deref(), Some("张三"));
        assert_eq!(kind, MatchKind::Exact);
    }

    #[test]
    fn test_fuzzy_match_strips_separators() {
        let matcher = NameMatcher::new();
        let roster = roster(&["张 三", "李四"]);
        let (name, kind) = matcher.match_name("张_三", &roster);
        assert_eq!(name.as_deref(), Some("张 三"));
        assert_eq!(kind, MatchKind::Fuzzy);
    }

    #[test]
    fn test_duplicate_roster_names_are_ambiguous() {
        let matcher = NameMatcher::new();
        // 名单里有两个完全同名的学生：绝不落到其中某一行
        let roster = roster(&["张三", "张三", "李四"]);
        let (name, kind) = matcher.match_name("张三", &roster);
        assert_eq!(name, None);
        assert_eq!(kind, MatchKind::Multiple);
    }

    #[test]
    fn test_exact_hit_with_normalized_collision_is_ambiguous() {
        let matcher = NameMatcher::new();
        // 候选与其中一条精确相等，但归一化后与另一条碰撞
        let roster = roster(&["张三", "张 三"]);
        let (name, kind) = matcher.match_name("张三", &roster);
        assert_eq!(name, None);
        assert_eq!(kind, MatchKind::Multiple);
    }

    #[test]
    fn test_ambiguous_fuzzy_is_multiple() {
        let matcher = NameMatcher::new();
        // 两个名单姓名归一化后碰撞
        let roster = roster(&["张 三", "张三"]);
        let (name, kind) = matcher.match_name("张-三", &roster);
        assert_eq!(name, None);
        assert_eq!(kind, MatchKind::Multiple);
    }

    #[test]
    fn test_filename_fallback() {
        let matcher = NameMatcher::new();
        let roster = roster(&["王五", "李四"]);
        let (name, kind) = matcher.match_by_filename("王五_第3次作业.docx", &roster);
        assert_eq!(name.as_deref(), Some("王五"));
        assert_eq!(kind, MatchKind::Filename);
    }

    #[test]
    fn test_filename_fallback_ambiguous() {
        let matcher = NameMatcher::new();
        let roster = roster(&["王五", "王五一"]);
        let (name, kind) = matcher.match_by_filename("王五一_作业.docx", &roster);
        assert_eq!(name, None);
        assert_eq!(kind, MatchKind::Multiple);
    }

    #[test]
    fn test_no_match() {
        let matcher = NameMatcher::new();
        let roster = roster(&["张三"]);
        let (name, kind) = matcher.match_name("赵六", &roster);
        assert_eq!(name, None);
        assert_eq!(kind, MatchKind::None);
    }

    #[test]
    fn test_empty_candidate() {
        let matcher = NameMatcher::new();
        let roster = roster(&["张三"]);
        let (name, kind) = matcher.match_name("   ", &roster);
        assert_eq!(name, None);
        assert_eq!(kind, MatchKind::None);
    }
}
