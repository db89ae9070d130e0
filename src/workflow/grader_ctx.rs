//! 阅卷员上下文
//!
//! 封装"我是几号阅卷员、我能不能推进试卷"这一信息

use crate::config::AdvancePolicy;
use std::fmt::Display;

/// 持有推进权的阅卷员编号（协调者策略下）
pub const COORDINATOR_ID: usize = 1;

/// 阅卷员上下文
#[derive(Debug, Clone)]
pub struct GraderCtx {
    /// 阅卷员编号（从 1 开始）
    pub worker: usize,

    /// 是否持有推进权
    pub may_advance: bool,

    /// 本阅卷员随机数种子
    pub seed: u64,
}

impl GraderCtx {
    /// 创建新的阅卷员上下文
    pub fn new(worker: usize, policy: AdvancePolicy, base_seed: u64) -> Self {
        let may_advance = match policy {
            AdvancePolicy::Coordinator => worker == COORDINATOR_ID,
            AdvancePolicy::AnyWorker => true,
        };
        Self {
            worker,
            may_advance,
            seed: base_seed ^ ((worker as u64) << 16),
        }
    }
}

impl Display for GraderCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[TA {}]", self.worker)
    }
}
