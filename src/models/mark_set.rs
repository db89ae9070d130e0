/// 当前试卷每道题的批改标记，以及剩余题数
///
/// 标记只会从 false 变为 true。剩余题数、标记和所属试卷的代数放在同一个
/// 单元里，加载新试卷时整体替换。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkSet {
    flags: Vec<bool>,
    remaining: i64,
    generation: u64,
}

impl MarkSet {
    /// 新试卷：全部未批改，剩余 R 题
    pub fn fresh(questions: usize, generation: u64) -> Self {
        Self {
            flags: vec![false; questions],
            remaining: questions as i64,
            generation,
        }
    }

    /// 这组标记属于哪一代试卷
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_marked(&self, question: usize) -> bool {
        self.flags.get(question).copied().unwrap_or(true)
    }

    /// 置位；已经置位时什么也不做
    pub fn set_marked(&mut self, question: usize) {
        if let Some(flag) = self.flags.get_mut(question) {
            *flag = true;
        }
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn set_remaining(&mut self, remaining: i64) {
        self.remaining = remaining;
    }

    pub fn all_marked(&self) -> bool {
        self.flags.iter().all(|f| *f)
    }

    pub fn marked_count(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }
}
