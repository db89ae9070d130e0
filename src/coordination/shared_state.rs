//! 共享状态
//!
//! 所有阅卷员共同可见的状态：评分标准、当前试卷、批改标记与剩余题数、
//! 试卷下标、代数和终止标志。这里的方法都是单步读或单步写，
//! 读-改-写的原子性由调用方持有 [`SyncDomain`] 的相应区域来保证。

use super::events::{Event, EventJournal, RaceArtifact};
use super::sync_domain::SyncDomain;
use crate::error::GradingResult;
use crate::infrastructure::{self, ExamSource};
use crate::models::{ExamRecord, MarkSet, Rubric};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

/// 屏障信号：代数与终止标志一起广播
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signal {
    pub generation: u64,
    pub terminated: bool,
}

/// 试卷加载结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamLoad {
    pub index: usize,
    pub generation: u64,
    pub student: String,
    pub sentinel: bool,
}

/// 共享状态
#[derive(Debug)]
pub struct SharedState {
    exam_files: Vec<String>,
    rubric_lines: usize,
    exam_lines: usize,
    sentinel: i64,

    rubric: RwLock<Vec<String>>,
    exam: RwLock<ExamRecord>,
    marks: RwLock<MarkSet>,
    exam_index: AtomicUsize,
    signal: watch::Sender<Signal>,

    exams_loaded: AtomicU64,
    marks_claimed: AtomicU64,
    rubric_writes: AtomicU64,
}

impl SharedState {
    /// 构造共享状态，尚未加载任何试卷
    pub fn new(exam_files: Vec<String>, rubric: Rubric, exam_lines: usize, sentinel: i64) -> Self {
        let rubric_lines = rubric.lines().len();
        let (signal, _) = watch::channel(Signal::default());
        Self {
            exam_files,
            rubric_lines,
            exam_lines,
            sentinel,
            rubric: RwLock::new(rubric.into_lines()),
            exam: RwLock::new(ExamRecord::default()),
            marks: RwLock::new(MarkSet::fresh(rubric_lines, 0)),
            exam_index: AtomicUsize::new(0),
            signal,
            exams_loaded: AtomicU64::new(0),
            marks_claimed: AtomicU64::new(0),
            rubric_writes: AtomicU64::new(0),
        }
    }

    /// 构造并在任何阅卷员启动前加载第一份试卷
    pub async fn initialize(
        exam_files: Vec<String>,
        rubric: Rubric,
        exam_lines: usize,
        sentinel: i64,
        source: &Arc<dyn ExamSource>,
        sync: &SyncDomain,
        journal: &EventJournal,
    ) -> GradingResult<Arc<Self>> {
        let state = Arc::new(Self::new(exam_files, rubric, exam_lines, sentinel));
        state
            .load_exam(0, super::events::STARTUP_LOADER, source, sync, journal)
            .await?;
        Ok(state)
    }

    // ========== 只读属性 ==========

    pub fn total_exams(&self) -> usize {
        self.exam_files.len()
    }

    pub fn rubric_lines(&self) -> usize {
        self.rubric_lines
    }

    // ========== 评分标准 ==========

    pub async fn rubric_line(&self, line: usize) -> String {
        self.rubric.read().await.get(line).cloned().unwrap_or_default()
    }

    pub async fn set_rubric_line(&self, line: usize, value: String) {
        if let Some(slot) = self.rubric.write().await.get_mut(line) {
            *slot = value;
            self.rubric_writes.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub async fn rubric_snapshot(&self) -> Vec<String> {
        self.rubric.read().await.clone()
    }

    // ========== 当前试卷 ==========

    pub async fn student_id(&self) -> String {
        self.exam.read().await.student_id().to_string()
    }

    /// 当前试卷是否为哨兵试卷
    pub async fn on_sentinel(&self) -> bool {
        self.exam.read().await.is_sentinel(self.sentinel)
    }

    // ========== 批改标记 ==========

    pub async fn is_marked(&self, question: usize) -> bool {
        self.marks.read().await.is_marked(question)
    }

    /// 一次读取标记及其所属代数
    pub async fn mark_status(&self, question: usize) -> (bool, u64) {
        let marks = self.marks.read().await;
        (marks.is_marked(question), marks.generation())
    }

    /// 置位并返回置位前的值
    pub async fn set_marked(&self, question: usize) -> bool {
        let mut marks = self.marks.write().await;
        let before = marks.is_marked(question);
        marks.set_marked(question);
        before
    }

    pub async fn questions_remaining(&self) -> i64 {
        self.marks.read().await.remaining()
    }

    pub async fn store_remaining(&self, remaining: i64) {
        self.marks.write().await.set_remaining(remaining);
    }

    pub async fn marks_snapshot(&self) -> MarkSet {
        self.marks.read().await.clone()
    }

    pub fn note_mark_claimed(&self) {
        self.marks_claimed.fetch_add(1, Ordering::SeqCst);
    }

    // ========== 进度 ==========

    pub fn exam_index(&self) -> usize {
        self.exam_index.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> u64 {
        self.signal.borrow().generation
    }

    pub fn is_terminated(&self) -> bool {
        self.signal.borrow().terminated
    }

    /// 订阅代数和终止标志的变化
    pub fn subscribe(&self) -> watch::Receiver<Signal> {
        self.signal.subscribe()
    }

    /// 置终止标志；只有第一次调用返回 true
    pub fn raise_termination(&self) -> bool {
        self.signal.send_if_modified(|s| {
            if s.terminated {
                false
            } else {
                s.terminated = true;
                true
            }
        })
    }

    pub fn exams_loaded(&self) -> u64 {
        self.exams_loaded.load(Ordering::SeqCst)
    }

    pub fn marks_claimed(&self) -> u64 {
        self.marks_claimed.load(Ordering::SeqCst)
    }

    pub fn rubric_writes(&self) -> u64 {
        self.rubric_writes.load(Ordering::SeqCst)
    }

    /// 加载第 `index` 份试卷
    ///
    /// 读取成功后才更新 `exam_index`；随后整份替换试卷，整体重置批改标记
    /// 与剩余题数，代数加一；学号是哨兵值时置终止标志。读取失败时状态不变。
    /// 只能由推进权持有者在推进区域内调用，或在启动时调用。
    pub async fn load_exam(
        &self,
        index: usize,
        worker: usize,
        source: &Arc<dyn ExamSource>,
        sync: &SyncDomain,
        journal: &EventJournal,
    ) -> GradingResult<ExamLoad> {
        let identifier = self.exam_files.get(index).cloned().unwrap_or_default();

        let lines = {
            let source = Arc::clone(source);
            let identifier = identifier.clone();
            infrastructure::run_blocking(worker, move || source.fetch(&identifier)).await?
        };
        self.exam_index.store(index, Ordering::SeqCst);
        let record = ExamRecord::new(identifier.clone(), lines, self.exam_lines);
        let student = record.student_id().to_string();
        let sentinel = record.is_sentinel(self.sentinel);

        let before = self.generation();
        let generation = before + 1;

        *self.exam.write().await = record;
        *self.marks.write().await = MarkSet::fresh(self.rubric_lines, generation);

        sync.race_window().await;
        let mut observed = before;
        self.signal.send_modify(|s| {
            observed = s.generation;
            s.generation = generation;
        });
        if observed != before {
            journal.record(Event::RaceDetected {
                worker,
                artifact: RaceArtifact::GenerationSkew {
                    expected: before,
                    observed,
                },
            });
        }
        self.exams_loaded.fetch_add(1, Ordering::SeqCst);

        journal.record(Event::ExamLoaded {
            worker,
            index,
            identifier,
            student: student.clone(),
            generation,
        });

        if sentinel && self.raise_termination() {
            info!("🛑 检测到哨兵试卷 ({})，发出终止信号", self.sentinel);
            journal.record(Event::TerminationRaised {
                worker,
                reason: format!("哨兵学号 {}", self.sentinel),
            });
        }

        Ok(ExamLoad {
            index,
            generation,
            student,
            sentinel,
        })
    }

    /// 释放共享状态
    ///
    /// 所有阅卷员退出后调用。仍有其他引用时只记录警告，不视为失败。
    pub fn teardown(state: Arc<Self>) -> bool {
        match Arc::try_unwrap(state) {
            Ok(state) => {
                drop(state);
                true
            }
            Err(still_shared) => {
                warn!(
                    "⚠️ 共享状态仍有 {} 处引用，无法释放",
                    Arc::strong_count(&still_shared) - 1
                );
                false
            }
        }
    }
}
