//! 事件日志
//!
//! 每一次与共享状态有关的读写都对应一个事件。事件总会通过 tracing 输出；
//! 开启记录时还会按顺序保存在内存中，供测试和事后分析检测竞争现象。

use crate::error::{GradingError, GradingResult, StoreKind};
use crate::utils::logging::truncate_text;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// 启动时加载第一份试卷的“阅卷员”编号
pub const STARTUP_LOADER: usize = 0;

/// 阅卷员退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// 观察到终止标志
    Terminated,
    /// 批完哨兵试卷
    SentinelReached,
    /// 没有更多试卷
    ExamsExhausted,
    /// 发生致命错误
    Failed,
}

/// 竞争现象
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "artifact", rename_all = "snake_case")]
pub enum RaceArtifact {
    /// 所有题已标记，但剩余计数不为 0
    RemainingMismatch { remaining: i64 },
    /// 同一道题在同一份试卷上被重复批改
    DuplicateMark { question: usize, generation: u64 },
    /// 推进后代数与预期不符（重复推进或丢失推进）
    GenerationSkew { expected: u64, observed: u64 },
}

/// 状态相关事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    RubricChecked { worker: usize, line: usize, value: String },
    RubricWritten { worker: usize, line: usize, from: char, to: char },
    RubricSaved { worker: usize },
    MarkChecked { worker: usize, question: usize, marked: bool },
    MarkClaimed { worker: usize, question: usize, remaining: i64, generation: u64 },
    MarkRecorded { worker: usize, question: usize, student: String, generation: u64 },
    ExamLoaded { worker: usize, index: usize, identifier: String, student: String, generation: u64 },
    BarrierWait { worker: usize, token: u64 },
    BarrierReleased { worker: usize, generation: u64, polls: u32 },
    RaceDetected { worker: usize, artifact: RaceArtifact },
    TerminationRaised { worker: usize, reason: String },
    WorkerExited { worker: usize, reason: ExitReason },
}

impl Event {
    fn is_read(&self) -> bool {
        matches!(
            self,
            Event::RubricChecked { .. } | Event::MarkChecked { .. } | Event::BarrierWait { .. }
        )
    }
}

fn who(worker: usize) -> String {
    if worker == STARTUP_LOADER {
        "[COORD]".to_string()
    } else {
        format!("[TA {}]", worker)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::RubricChecked { worker, line, value } => {
                write!(f, "{} 读取评分标准 rubric[{}] = '{}'", who(*worker), line, truncate_text(value, 40))
            }
            Event::RubricWritten { worker, line, from, to } => {
                write!(f, "{} 修改评分标准 rubric[{}]: {} -> {}", who(*worker), line + 1, from, to)
            }
            Event::RubricSaved { worker } => write!(f, "{} 评分标准已保存", who(*worker)),
            Event::MarkChecked { worker, question, marked } => {
                write!(f, "{} 读取 marked[{}] = {}", who(*worker), question, u8::from(*marked))
            }
            Event::MarkClaimed { worker, question, remaining, .. } => write!(
                f,
                "{} 写入 marked[{}] = 1, remaining={}",
                who(*worker),
                question,
                remaining
            ),
            Event::MarkRecorded { worker, question, student, .. } => {
                write!(f, "{} 已批改学生 {} 的第 {} 题", who(*worker), truncate_text(student, 20), question + 1)
            }
            Event::ExamLoaded { worker, index, identifier, student, generation } => write!(
                f,
                "{} 加载试卷 '{}' (index={}, gen={})，学生 {}",
                who(*worker),
                identifier,
                index,
                generation,
                student
            ),
            Event::BarrierWait { worker, token } => {
                write!(f, "{} 等待下一份试卷 (gen={})", who(*worker), token)
            }
            Event::BarrierReleased { worker, generation, polls } => write!(
                f,
                "{} 屏障释放 (gen={}, 轮询 {} 次)",
                who(*worker),
                generation,
                polls
            ),
            Event::RaceDetected { worker, artifact } => {
                write!(f, "{} 检测到竞争现象: {:?}", who(*worker), artifact)
            }
            Event::TerminationRaised { worker, reason } => {
                write!(f, "{} 发出终止信号: {}", who(*worker), reason)
            }
            Event::WorkerExited { worker, reason } => {
                write!(f, "{} 退出 ({:?})", who(*worker), reason)
            }
        }
    }
}

/// 带序号和时间戳的事件
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

/// 事件日志
#[derive(Debug, Default)]
pub struct EventJournal {
    enabled: bool,
    next_seq: AtomicU64,
    races: AtomicU64,
    entries: Mutex<Vec<RecordedEvent>>,
}

impl EventJournal {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    /// 输出并（可选）记录一个事件
    pub fn record(&self, event: Event) {
        match &event {
            Event::RaceDetected { .. } => {
                self.races.fetch_add(1, Ordering::SeqCst);
                warn!("⚠️ {}", event)
            }
            e if e.is_read() => debug!("{}", event),
            _ => info!("{}", event),
        }

        if !self.enabled {
            return;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(RecordedEvent {
            seq,
            at: Utc::now(),
            event,
        });
    }

    /// 已检测到的竞争现象数量（无论是否开启记录）
    pub fn race_artifacts(&self) -> u64 {
        self.races.load(Ordering::SeqCst)
    }

    /// 按序号排列的事件副本
    pub fn snapshot(&self) -> Vec<RecordedEvent> {
        let mut events = self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone();
        events.sort_by_key(|e| e.seq);
        events
    }

    /// 以 JSON lines 写出全部事件
    pub fn write_json_lines(&self, path: &Path) -> GradingResult<usize> {
        let events = self.snapshot();
        let file = std::fs::File::create(path)
            .map_err(|e| GradingError::store_unavailable(StoreKind::EventLog, path, e))?;
        let mut writer = std::io::BufWriter::new(file);
        for event in &events {
            let line = serde_json::to_string(event).map_err(|e| {
                GradingError::store_unavailable(StoreKind::EventLog, path, std::io::Error::other(e))
            })?;
            writeln!(writer, "{}", line)
                .map_err(|e| GradingError::store_unavailable(StoreKind::EventLog, path, e))?;
        }
        writer
            .flush()
            .map_err(|e| GradingError::store_unavailable(StoreKind::EventLog, path, e))?;
        Ok(events.len())
    }
}
