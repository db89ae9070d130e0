//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责阅卷会话的生命周期，是整个系统的"指挥中心"。
//!
//! ### `session` - 阅卷会话
//! - 校验配置，读取评分标准并补齐
//! - 在任何阅卷员启动前加载第一份试卷
//! - 启动 N 名阅卷员并等待它们全部退出
//! - 汇总运行结果，写出事件日志，释放共享状态
//!
//! ## 层次关系
//!
//! ```text
//! session (管理 N 名阅卷员)
//!     ↓
//! workflow::Grader (单名阅卷员的循环)
//!     ↓
//! coordination (共享状态 / 同步域 / 事件日志)
//!     ↓
//! infrastructure (评分标准存储 / 试卷来源)
//! ```

pub mod session;

pub use session::{GradingSession, RunReport};
