use std::path::{Path, PathBuf};
use thiserror::Error;

/// 阅卷池错误类型
///
/// 只有致命错误会出现在这里。未同步模式下的竞争现象（重复批改、
/// 计数丢失、重复推进）不是错误，它们通过事件日志暴露。
#[derive(Debug, Error)]
pub enum GradingError {
    /// 评分标准或试卷存储不可读写
    #[error("{resource} 存储不可用 ({}): {source}", path.display())]
    StoreUnavailable {
        resource: StoreKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 启动前发现的配置错误
    #[error("配置无效: {reason}")]
    ConfigurationInvalid { reason: String },

    /// 阅卷任务异常结束（panic 或被取消）
    #[error("阅卷员 {worker} 异常退出: {reason}")]
    WorkerAborted { worker: usize, reason: String },
}

/// 存储种类，仅用于诊断信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Rubric,
    Exam,
    EventLog,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Rubric => write!(f, "评分标准"),
            StoreKind::Exam => write!(f, "试卷"),
            StoreKind::EventLog => write!(f, "事件日志"),
        }
    }
}

// ========== 便捷构造函数 ==========

impl GradingError {
    /// 创建存储不可用错误
    pub fn store_unavailable(resource: StoreKind, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        GradingError::StoreUnavailable {
            resource,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// 创建配置错误
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        GradingError::ConfigurationInvalid {
            reason: reason.into(),
        }
    }
}

/// 阅卷池结果类型
pub type GradingResult<T> = Result<T, GradingError>;
