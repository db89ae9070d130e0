//! 试卷来源 - 基础设施层
//!
//! 提供有序的试卷标识列表，以及按标识读取试卷内容

use crate::error::{GradingError, GradingResult, StoreKind};
use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

/// 试卷来源
pub trait ExamSource: Send + Sync {
    /// 有序的试卷标识
    fn list(&self) -> Vec<String>;

    /// 读取试卷的所有行，截断由调用方负责
    fn fetch(&self, identifier: &str) -> GradingResult<Vec<String>>;
}

/// 按文件路径读取试卷
pub struct FileExamSource {
    files: Vec<String>,
}

impl FileExamSource {
    pub fn new(files: Vec<String>) -> Self {
        Self { files }
    }
}

impl ExamSource for FileExamSource {
    fn list(&self) -> Vec<String> {
        self.files.clone()
    }

    fn fetch(&self, identifier: &str) -> GradingResult<Vec<String>> {
        let content = fs::read_to_string(identifier)
            .map_err(|e| GradingError::store_unavailable(StoreKind::Exam, identifier, e))?;
        Ok(content.lines().map(str::to_string).collect())
    }
}

/// 内存中的试卷来源，记录每次读取
pub struct MemoryExamSource {
    order: Vec<String>,
    exams: HashMap<String, Vec<String>>,
    fetched: Mutex<Vec<String>>,
}

impl MemoryExamSource {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            exams: HashMap::new(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// 追加一份试卷
    pub fn with_exam(mut self, identifier: impl Into<String>, lines: &[&str]) -> Self {
        let identifier = identifier.into();
        self.order.push(identifier.clone());
        self.exams
            .insert(identifier, lines.iter().map(|l| l.to_string()).collect());
        self
    }

    /// 列表中有、但读取时会失败的试卷
    pub fn with_missing_exam(mut self, identifier: impl Into<String>) -> Self {
        self.order.push(identifier.into());
        self
    }

    /// 按顺序列出已读取过的试卷
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MemoryExamSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ExamSource for MemoryExamSource {
    fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    fn fetch(&self, identifier: &str) -> GradingResult<Vec<String>> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(identifier.to_string());

        self.exams.get(identifier).cloned().ok_or_else(|| {
            GradingError::store_unavailable(
                StoreKind::Exam,
                identifier,
                std::io::Error::new(std::io::ErrorKind::NotFound, "exam not found"),
            )
        })
    }
}
