//! # Marking Pool
//!
//! 多名阅卷员共享一份可变的评分标准，协同批改一系列试卷
//!
//! ## 架构设计
//!
//! ### ① 数据层（Models）
//! - `models/` - 评分标准行、试卷记录、批改标记
//!
//! ### ② 基础设施层（Infrastructure）
//! - `infrastructure/` - 评分标准存储、试卷来源，只暴露读写能力
//!
//! ### ③ 协调层（Coordination）
//! - `SharedState` - 所有阅卷员可见的共享状态
//! - `SyncDomain` - 评分标准 / 推进 / 题目三个互斥区域
//! - `EventJournal` - 每次状态读写对应一个事件
//!
//! ### ④ 流程层（Workflow）
//! - `Grader` - 单名阅卷员的循环：检查评分标准 → 批改 → 推进或等待
//!
//! ### ⑤ 编排层（Orchestration）
//! - `GradingSession` - 初始化、启动阅卷员、汇总、清理
//!
//! ## 模块结构

pub mod cli;
pub mod config;
pub mod coordination;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{AdvancePolicy, Config, DelayRange, SyncMode};
pub use coordination::{Event, EventJournal, ExitReason, RaceArtifact, SharedState, SyncDomain};
pub use error::{GradingError, GradingResult};
pub use infrastructure::{
    ExamSource, FileExamSource, FileRubricStore, MemoryExamSource, MemoryRubricStore, RubricStore,
};
pub use orchestrator::{GradingSession, RunReport};
pub use workflow::{Grader, GraderCtx, WorkerSummary};
