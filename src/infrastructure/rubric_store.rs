//! 评分标准存储 - 基础设施层
//!
//! 只负责"读写整份评分标准"，不关心行数补齐和并发

use crate::error::{GradingError, GradingResult, StoreKind};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// 评分标准存储
///
/// `save` 每次覆盖全部内容，不做增量写入。
pub trait RubricStore: Send + Sync {
    /// 读取所有行（不补齐，补齐由调用方负责）
    fn load(&self) -> GradingResult<Vec<String>>;

    /// 覆盖写入所有行
    fn save(&self, lines: &[String]) -> GradingResult<()>;

    /// 用于日志的描述
    fn location(&self) -> String;
}

/// 基于文本文件的评分标准存储
pub struct FileRubricStore {
    path: PathBuf,
}

impl FileRubricStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RubricStore for FileRubricStore {
    fn load(&self) -> GradingResult<Vec<String>> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| GradingError::store_unavailable(StoreKind::Rubric, &self.path, e))?;
        Ok(content.lines().map(str::to_string).collect())
    }

    fn save(&self, lines: &[String]) -> GradingResult<()> {
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&self.path, content)
            .map_err(|e| GradingError::store_unavailable(StoreKind::Rubric, &self.path, e))?;
        debug!("评分标准已写入 {}", self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// 内存中的评分标准存储，记录保存次数
pub struct MemoryRubricStore {
    lines: Mutex<Vec<String>>,
    saves: AtomicUsize,
    unavailable: bool,
}

impl MemoryRubricStore {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: Mutex::new(lines),
            saves: AtomicUsize::new(0),
            unavailable: false,
        }
    }

    /// 任何读写都会失败的存储
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(Vec::new())
        }
    }

    /// 最近一次保存的内容
    pub fn contents(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check(&self) -> GradingResult<()> {
        if self.unavailable {
            return Err(GradingError::store_unavailable(
                StoreKind::Rubric,
                self.location(),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "store marked unavailable"),
            ));
        }
        Ok(())
    }
}

impl RubricStore for MemoryRubricStore {
    fn load(&self) -> GradingResult<Vec<String>> {
        self.check()?;
        Ok(self.contents())
    }

    fn save(&self, lines: &[String]) -> GradingResult<()> {
        self.check()?;
        *self.lines.lock().unwrap_or_else(|e| e.into_inner()) = lines.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory://rubric".to_string()
    }
}
