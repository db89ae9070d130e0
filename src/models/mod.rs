pub mod exam;
pub mod mark_set;
pub mod rubric;

pub use exam::ExamRecord;
pub use mark_set::MarkSet;
pub use rubric::{LineRevision, Rubric};
