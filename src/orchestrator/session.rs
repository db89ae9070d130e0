//! 阅卷会话 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个阅卷池的入口，负责共享状态的生命周期和阅卷员的调度。
//!
//! ## 核心功能
//!
//! 1. **初始化**：校验配置、读取评分标准（不足补齐）、加载第一份试卷
//! 2. **启动阅卷员**：每名阅卷员是一个长期运行的 tokio 任务
//! 3. **汇总**：等待全部阅卷员退出，收集统计和事件日志
//! 4. **清理**：释放共享状态，失败只记录不报错
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一持有存储和同步域的模块
//! - **致命错误优先**：任何阅卷员的致命错误都会让整个会话失败

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::coordination::{Event, EventJournal, RecordedEvent, SharedState, SyncDomain};
use crate::error::{GradingError, GradingResult};
use crate::infrastructure::{ExamSource, FileExamSource, FileRubricStore, RubricStore};
use crate::models::Rubric;
use crate::utils::logging;
use crate::workflow::{Grader, GraderCtx, GraderSettings, GradingHandles, WorkerSummary};

/// 一次运行的最终结果
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub exam_index: usize,
    pub generation: u64,
    pub terminated: bool,
    pub exams_loaded: u64,
    pub marks_claimed: u64,
    pub questions_remaining: i64,
    pub rubric: Vec<String>,
    pub rubric_writes: u64,
    pub race_artifacts: u64,
    pub workers: Vec<WorkerSummary>,
    pub events: Vec<RecordedEvent>,
}

impl RunReport {
    /// 是否观察到任何竞争现象
    pub fn has_race_artifacts(&self) -> bool {
        self.race_artifacts > 0
    }

    /// 从事件中筛选出某一类
    pub fn events_matching<F>(&self, predicate: F) -> Vec<&Event>
    where
        F: Fn(&Event) -> bool,
    {
        self.events
            .iter()
            .map(|e| &e.event)
            .filter(|e| predicate(e))
            .collect()
    }
}

/// 阅卷会话
pub struct GradingSession {
    config: Config,
    handles: GradingHandles,
    base_seed: u64,
}

impl GradingSession {
    /// 使用文件存储初始化
    pub async fn from_config(config: Config) -> GradingResult<Self> {
        let rubric_store = Arc::new(FileRubricStore::new(config.rubric_path.clone()));
        let exam_source = Arc::new(FileExamSource::new(config.exam_files.clone()));
        Self::initialize(config, rubric_store, exam_source).await
    }

    /// 初始化共享状态并加载第一份试卷，阅卷员尚未启动
    pub async fn initialize(
        mut config: Config,
        rubric_store: Arc<dyn RubricStore>,
        exam_source: Arc<dyn ExamSource>,
    ) -> GradingResult<Self> {
        config.exam_files = exam_source.list();
        config.validate()?;

        let loaded = rubric_store.load()?;
        if loaded.len() < config.rubric_lines {
            info!(
                "评分标准 {} 只有 {} 行，补齐到 {} 行",
                rubric_store.location(),
                loaded.len(),
                config.rubric_lines
            );
        }
        let rubric = Rubric::from_loaded(loaded, config.rubric_lines);

        let sync = Arc::new(SyncDomain::new(config.sync_mode));
        let journal = Arc::new(EventJournal::new(config.journal_enabled()));
        let state = SharedState::initialize(
            config.exam_files.clone(),
            rubric,
            config.exam_lines,
            config.sentinel_student,
            &exam_source,
            &sync,
            &journal,
        )
        .await?;

        let base_seed = config.seed.unwrap_or_else(|| fastrand::u64(..));

        Ok(Self {
            config,
            handles: GradingHandles {
                state,
                sync,
                rubric_store,
                exam_source,
                journal,
            },
            base_seed,
        })
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.handles.state
    }

    /// 启动所有阅卷员，等待它们退出后汇总
    pub async fn run(self) -> GradingResult<RunReport> {
        logging::log_startup(&self.config);

        let settings = GraderSettings::from(&self.config);
        let handles: Vec<_> = (1..=self.config.worker_count)
            .map(|worker| {
                let ctx = GraderCtx::new(worker, self.config.advance_policy, self.base_seed);
                let grader = Grader::new(ctx, settings.clone(), self.handles.clone());
                (worker, tokio::spawn(grader.run()))
            })
            .collect();

        let (workers, tasks): (Vec<usize>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(tasks).await;

        let mut summaries = Vec::with_capacity(results.len());
        let mut first_error: Option<GradingError> = None;
        for (worker, result) in workers.into_iter().zip(results) {
            match result {
                Ok(Ok(summary)) => summaries.push(summary),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(join_err) => {
                    error!("[TA {}] 任务异常结束: {}", worker, join_err);
                    self.handles.state.raise_termination();
                    first_error.get_or_insert(GradingError::WorkerAborted {
                        worker,
                        reason: join_err.to_string(),
                    });
                }
            }
        }

        let report = self.build_report(summaries).await;

        if let Some(path) = &self.config.events_path {
            match self.handles.journal.write_json_lines(path) {
                Ok(count) => info!("📝 已写出 {} 条事件到 {}", count, path.display()),
                Err(e) => warn!("⚠️ 事件日志写出失败: {}", e),
            }
        }

        let Self { config, handles, .. } = self;
        let GradingHandles { state, .. } = handles;
        SharedState::teardown(state);

        if let Some(e) = first_error {
            error!("❌ 阅卷因致命错误终止: {}", e);
            return Err(e);
        }

        logging::print_final_stats(&report, &config);
        Ok(report)
    }

    async fn build_report(&self, workers: Vec<WorkerSummary>) -> RunReport {
        let state = &self.handles.state;
        let events = self.handles.journal.snapshot();
        let race_artifacts = self.handles.journal.race_artifacts();

        RunReport {
            exam_index: state.exam_index(),
            generation: state.generation(),
            terminated: state.is_terminated(),
            exams_loaded: state.exams_loaded(),
            marks_claimed: state.marks_claimed(),
            questions_remaining: state.questions_remaining().await,
            rubric: state.rubric_snapshot().await,
            rubric_writes: state.rubric_writes(),
            race_artifacts,
            workers,
            events,
        }
    }
}
