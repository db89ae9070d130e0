//! 协调层（Coordination Layer）
//!
//! ## 职责
//!
//! 持有所有阅卷员共享的状态，以及保护它的互斥区域。
//!
//! ### `shared_state` - 共享状态
//! - 评分标准、当前试卷、批改标记、剩余题数
//! - 试卷下标、代数、终止标志（代数与终止标志通过 watch 通道广播）
//!
//! ### `sync_domain` - 同步域
//! - `rubric` / `advance` / `question` 三个互不嵌套的区域
//! - 未同步模式下为空操作
//!
//! ### `events` - 事件日志
//! - 每一次状态相关的读写对应一个事件，用作竞争检测的依据

pub mod events;
pub mod shared_state;
pub mod sync_domain;

pub use events::{Event, EventJournal, ExitReason, RaceArtifact, RecordedEvent};
pub use shared_state::{ExamLoad, SharedState, Signal};
pub use sync_domain::{RegionGuard, SyncDomain};
