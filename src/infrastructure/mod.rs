pub mod exam_source;
pub mod rubric_store;

pub use exam_source::{ExamSource, FileExamSource, MemoryExamSource};
pub use rubric_store::{FileRubricStore, MemoryRubricStore, RubricStore};

use crate::error::{GradingError, GradingResult};

/// 在阻塞线程池上执行一次存储读写
///
/// 存储实现内部的 panic 原样传回调用方任务；任务被取消视为致命错误。
pub async fn run_blocking<T, F>(worker: usize, f: F) -> GradingResult<T>
where
    F: FnOnce() -> GradingResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(GradingError::WorkerAborted {
            worker,
            reason: e.to_string(),
        }),
    }
}
