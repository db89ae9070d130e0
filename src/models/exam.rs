/// 当前加载的试卷
///
/// 整份替换，不会被部分修改。第一行是学号。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExamRecord {
    /// 试卷标识（文件名）
    pub identifier: String,
    pub lines: Vec<String>,
}

impl ExamRecord {
    /// 创建试卷记录，最多保留 `max_lines` 行
    pub fn new(identifier: impl Into<String>, mut lines: Vec<String>, max_lines: usize) -> Self {
        lines.truncate(max_lines);
        Self {
            identifier: identifier.into(),
            lines,
        }
    }

    /// 学号原文（第一行，去掉首尾空白）
    pub fn student_id(&self) -> &str {
        self.lines.first().map(|l| l.trim()).unwrap_or("")
    }

    /// 按 `atoi` 的规则解析学号
    pub fn student_number(&self) -> i64 {
        parse_leading_int(self.student_id())
    }

    pub fn is_sentinel(&self, sentinel: i64) -> bool {
        self.student_number() == sentinel
    }
}

/// 跳过前导空白，读取可选符号和连续数字；没有数字时为 0
pub fn parse_leading_int(text: &str) -> i64 {
    let s = text.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    if negative {
        -value
    } else {
        value
    }
}
