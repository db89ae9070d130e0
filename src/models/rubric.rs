//! 评分标准数据模型
//!
//! 每行形如 `"1, A"`：题号、逗号、空格、等级字母，后面可以跟任意文本。

/// 等级字母的下界
pub const FLOOR_LETTER: char = 'A';
/// 等级字母的上界，越过后回到下界
pub const CEILING_LETTER: char = 'Z';

/// 评分标准：固定 R 行的可变文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rubric {
    lines: Vec<String>,
}

impl Rubric {
    /// 由存储中读到的行构造，不足 R 行时补默认行，多余的行丢弃
    pub fn from_loaded(mut lines: Vec<String>, rubric_lines: usize) -> Self {
        lines.truncate(rubric_lines);
        for i in lines.len()..rubric_lines {
            lines.push(default_line(i));
        }
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// 第 i 行（从 0 开始）的默认内容
pub fn default_line(i: usize) -> String {
    let letter = (FLOOR_LETTER as u8 + (i % 26) as u8) as char;
    format!("{}, {}", i + 1, letter)
}

/// 等级字母循环递增：A..Y 加一，其余（包括 Z）回到 A
pub fn cycle_letter(c: char) -> char {
    if (FLOOR_LETTER..CEILING_LETTER).contains(&c) {
        (c as u8 + 1) as char
    } else {
        FLOOR_LETTER
    }
}

/// 一次评分标准修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRevision {
    pub from: char,
    pub to: char,
    pub line: String,
}

/// 修改逗号后第二个字符（等级字母）
///
/// 没有逗号或逗号后不足两个字符时返回 `None`，该行保持不变。
pub fn revise_line(line: &str) -> Option<LineRevision> {
    let comma = line.find(',')?;
    let (offset, from) = line[comma..].char_indices().nth(2)?;
    if from == '\n' || from == '\r' {
        return None;
    }
    let pos = comma + offset;
    let to = cycle_letter(from);

    let mut revised = line.to_string();
    revised.replace_range(pos..pos + from.len_utf8(), to.encode_utf8(&mut [0u8; 4]));
    Some(LineRevision {
        from,
        to,
        line: revised,
    })
}

/// 读取一行的等级字母
pub fn grade_letter(line: &str) -> Option<char> {
    let comma = line.find(',')?;
    line[comma..].chars().nth(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_loaded_pads_missing_lines() {
        let rubric = Rubric::from_loaded(vec!["1, A".to_string(), "2, B".to_string()], 5);
        assert_eq!(rubric.lines(), &["1, A", "2, B", "3, C", "4, D", "5, E"]);
    }

    #[test]
    fn test_from_loaded_drops_extra_lines() {
        let loaded = (0..8).map(default_line).collect();
        let rubric = Rubric::from_loaded(loaded, 3);
        assert_eq!(rubric.lines().len(), 3);
    }

    #[test]
    fn test_default_line_wraps_letters() {
        assert_eq!(default_line(0), "1, A");
        assert_eq!(default_line(25), "26, Z");
        assert_eq!(default_line(26), "27, A");
    }

    #[test]
    fn test_cycle_letter_wraps_past_ceiling() {
        assert_eq!(cycle_letter('A'), 'B');
        assert_eq!(cycle_letter('Y'), 'Z');
        assert_eq!(cycle_letter('Z'), 'A');
        assert_eq!(cycle_letter('q'), 'A');
    }

    #[test]
    fn test_revise_line_keeps_free_text() {
        let rev = revise_line("3, C partial credit for units").unwrap();
        assert_eq!(rev.from, 'C');
        assert_eq!(rev.to, 'D');
        assert_eq!(rev.line, "3, D partial credit for units");
    }

    #[test]
    fn test_revise_line_without_letter_is_untouched() {
        assert!(revise_line("no comma here").is_none());
        assert!(revise_line("4,").is_none());
        assert!(revise_line("4, ").is_none());
    }

    #[test]
    fn test_grade_letter() {
        assert_eq!(grade_letter("2, K"), Some('K'));
        assert_eq!(grade_letter("2"), None);
    }
}
