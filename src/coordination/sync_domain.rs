//! 同步域
//!
//! 三个互不嵌套的互斥区域，分别保护共享状态中互不相交的部分：
//!
//! - `rubric`：评分标准的读-改-写以及整份保存
//! - `advance`：“当前试卷是否已批完 → 推进到下一份”的判断
//! - `question`：单个批改标记的检查-置位以及剩余题数递减
//!
//! 未同步模式下三个区域都是空操作，并在每次读-改-写之间让出一次调度，
//! 使丢失更新可以稳定复现。

use crate::config::SyncMode;
use tokio::sync::{Mutex, MutexGuard};

/// 同步域
#[derive(Debug)]
pub struct SyncDomain {
    mode: SyncMode,
    rubric: Mutex<()>,
    advance: Mutex<()>,
    question: Mutex<()>,
}

/// 进入某个区域后持有的凭证，离开作用域即释放
#[must_use = "区域在凭证被丢弃时立即释放"]
pub struct RegionGuard<'a> {
    held: Option<MutexGuard<'a, ()>>,
}

impl RegionGuard<'_> {
    /// 是否真正持有互斥锁
    pub fn is_exclusive(&self) -> bool {
        self.held.is_some()
    }
}

impl SyncDomain {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            rubric: Mutex::new(()),
            advance: Mutex::new(()),
            question: Mutex::new(()),
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub async fn rubric(&self) -> RegionGuard<'_> {
        self.enter(&self.rubric).await
    }

    pub async fn advance(&self) -> RegionGuard<'_> {
        self.enter(&self.advance).await
    }

    pub async fn question(&self) -> RegionGuard<'_> {
        self.enter(&self.question).await
    }

    /// 读与写之间的竞争窗口
    pub async fn race_window(&self) {
        if self.mode == SyncMode::Unsynchronized {
            tokio::task::yield_now().await;
        }
    }

    async fn enter<'a>(&'a self, region: &'a Mutex<()>) -> RegionGuard<'a> {
        match self.mode {
            SyncMode::Guarded => RegionGuard {
                held: Some(region.lock().await),
            },
            SyncMode::Unsynchronized => RegionGuard { held: None },
        }
    }
}
