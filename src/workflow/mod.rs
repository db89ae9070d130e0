pub mod grader;
pub mod grader_ctx;

pub use grader::{Grader, GraderSettings, GradingHandles, WorkerSummary};
pub use grader_ctx::{GraderCtx, COORDINATOR_ID};
