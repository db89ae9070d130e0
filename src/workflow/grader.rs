//! 阅卷流程 - 流程层
//!
//! 核心职责：定义"一名阅卷员"的循环
//!
//! 状态顺序：
//! 1. 检查评分标准（每行随机思考时间，按概率修改一个等级字母并整份保存）
//! 2. 批改题目（逐题抢占未批改的题，抢到后花时间批改）
//! 3. 推进或等待（推进权持有者在推进区域内判断是否加载下一份试卷，
//!    其余阅卷员在代数屏障上等待）
//!
//! 终止标志在每轮开始、推进判断和屏障等待时检查，不会打断正在进行的延迟。

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::{AdvancePolicy, Config, DelayRange, SyncMode};
use crate::coordination::{Event, EventJournal, ExitReason, RaceArtifact, SharedState, SyncDomain};
use crate::error::GradingResult;
use crate::infrastructure::{self, ExamSource, RubricStore};
use crate::models::rubric;
use crate::workflow::grader_ctx::GraderCtx;

/// 阅卷员共用的句柄
#[derive(Clone)]
pub struct GradingHandles {
    pub state: Arc<SharedState>,
    pub sync: Arc<SyncDomain>,
    pub rubric_store: Arc<dyn RubricStore>,
    pub exam_source: Arc<dyn ExamSource>,
    pub journal: Arc<EventJournal>,
}

/// 阅卷循环的可调参数
#[derive(Debug, Clone)]
pub struct GraderSettings {
    pub rubric_change_probability: f64,
    pub review_delay: DelayRange,
    pub marking_delay: DelayRange,
    pub poll_interval: Duration,
    pub advance_policy: AdvancePolicy,
}

impl From<&Config> for GraderSettings {
    fn from(config: &Config) -> Self {
        Self {
            rubric_change_probability: config.rubric_change_probability,
            review_delay: config.review_delay,
            marking_delay: config.marking_delay,
            poll_interval: config.poll_interval(),
            advance_policy: config.advance_policy,
        }
    }
}

/// 单个阅卷员的统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerSummary {
    pub worker: usize,
    pub iterations: u64,
    pub rubric_writes: u64,
    pub marks: u64,
    pub exams_advanced: u64,
    pub barrier_waits: u64,
    pub exit: Option<ExitReason>,
}

/// 一轮结束后的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Exit(ExitReason),
}

/// 推进判断的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Loaded,
    Pending { token: u64 },
    Finished(ExitReason),
}

/// 一次成功抢占的题目
#[derive(Debug, Clone, PartialEq, Eq)]
struct Claim {
    student: String,
    generation: u64,
}

/// 阅卷员任务的退出守卫
///
/// 任务 panic 或被取消时置终止标志，避免其他阅卷员在屏障上一直等待。
struct ExitGuard {
    worker: usize,
    state: Arc<SharedState>,
    journal: Arc<EventJournal>,
    armed: bool,
}

impl ExitGuard {
    fn new(worker: usize, handles: &GradingHandles) -> Self {
        Self {
            worker,
            state: Arc::clone(&handles.state),
            journal: Arc::clone(&handles.journal),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        error!("[TA {}] ❌ 任务异常中止", self.worker);
        if self.state.raise_termination() {
            self.journal.record(Event::TerminationRaised {
                worker: self.worker,
                reason: "阅卷员任务异常中止".to_string(),
            });
        }
    }
}

/// 阅卷员
pub struct Grader {
    ctx: GraderCtx,
    settings: GraderSettings,
    handles: GradingHandles,
    rng: fastrand::Rng,
    summary: WorkerSummary,
}

impl Grader {
    /// 创建新的阅卷员
    pub fn new(ctx: GraderCtx, settings: GraderSettings, handles: GradingHandles) -> Self {
        let rng = fastrand::Rng::with_seed(ctx.seed);
        let summary = WorkerSummary {
            worker: ctx.worker,
            ..Default::default()
        };
        Self {
            ctx,
            settings,
            handles,
            rng,
            summary,
        }
    }

    /// 运行阅卷循环直到退出
    ///
    /// 致命错误会先置终止标志，让其他阅卷员尽快退出，再把错误返回；
    /// 任务 panic 或被取消时由退出守卫置终止标志。
    pub async fn run(mut self) -> GradingResult<WorkerSummary> {
        info!("{} 开始阅卷 (推进权: {})", self.ctx, self.ctx.may_advance);
        let guard = ExitGuard::new(self.ctx.worker, &self.handles);

        let outcome = self.grade_loop().await;
        guard.disarm();

        match outcome {
            Ok(reason) => {
                self.finish(reason);
                Ok(self.summary)
            }
            Err(e) => {
                error!("{} ❌ 致命错误: {}", self.ctx, e);
                if self.handles.state.raise_termination() {
                    self.handles.journal.record(Event::TerminationRaised {
                        worker: self.ctx.worker,
                        reason: e.to_string(),
                    });
                }
                self.finish(ExitReason::Failed);
                Err(e)
            }
        }
    }

    async fn grade_loop(&mut self) -> GradingResult<ExitReason> {
        loop {
            if self.handles.state.is_terminated() {
                info!("{} 收到终止信号，退出", self.ctx);
                return Ok(ExitReason::Terminated);
            }
            self.summary.iterations += 1;

            self.check_rubric().await?;
            self.mark_questions().await;

            match self.advance_or_wait().await? {
                Step::Continue => continue,
                Step::Exit(reason) => return Ok(reason),
            }
        }
    }

    // ========== 评分标准 ==========

    async fn check_rubric(&mut self) -> GradingResult<()> {
        debug!("{} 检查评分标准...", self.ctx);

        for line in 0..self.handles.state.rubric_lines() {
            let value = self.handles.state.rubric_line(line).await;
            self.handles.journal.record(Event::RubricChecked {
                worker: self.ctx.worker,
                line,
                value,
            });

            self.pause(self.settings.review_delay).await;

            if self.rng.f64() < self.settings.rubric_change_probability {
                self.revise_rubric_line(line).await?;
            }
        }
        Ok(())
    }

    /// 在评分标准区域内修改一行并整份保存
    async fn revise_rubric_line(&mut self, line: usize) -> GradingResult<()> {
        let _guard = self.handles.sync.rubric().await;

        let current = self.handles.state.rubric_line(line).await;
        let Some(revision) = rubric::revise_line(&current) else {
            debug!("{} rubric[{}] 没有等级字母，跳过", self.ctx, line);
            return Ok(());
        };

        self.handles.sync.race_window().await;
        self.handles.state.set_rubric_line(line, revision.line).await;
        self.handles.journal.record(Event::RubricWritten {
            worker: self.ctx.worker,
            line,
            from: revision.from,
            to: revision.to,
        });

        let snapshot = self.handles.state.rubric_snapshot().await;
        let store = Arc::clone(&self.handles.rubric_store);
        infrastructure::run_blocking(self.ctx.worker, move || store.save(&snapshot)).await?;
        self.handles.journal.record(Event::RubricSaved {
            worker: self.ctx.worker,
        });

        self.summary.rubric_writes += 1;
        Ok(())
    }

    // ========== 批改 ==========

    async fn mark_questions(&mut self) {
        for question in 0..self.handles.state.rubric_lines() {
            let Some(claim) = self.claim_question(question).await else {
                continue;
            };

            // 批改时间不占用任何区域
            self.pause(self.settings.marking_delay).await;

            self.handles.journal.record(Event::MarkRecorded {
                worker: self.ctx.worker,
                question,
                student: claim.student,
                generation: claim.generation,
            });
            self.summary.marks += 1;
        }
    }

    /// 在题目区域内检查并置位标记、递减剩余题数；已被批改时返回 `None`
    ///
    /// 学号在区域内读取：本题未批完之前当前试卷不会被替换。
    async fn claim_question(&self, question: usize) -> Option<Claim> {
        let state = &self.handles.state;
        let _guard = self.handles.sync.question().await;

        let (marked, generation) = state.mark_status(question).await;
        self.handles.journal.record(Event::MarkChecked {
            worker: self.ctx.worker,
            question,
            marked,
        });
        if marked {
            return None;
        }
        let student = state.student_id().await;

        self.handles.sync.race_window().await;
        if state.set_marked(question).await {
            self.handles.journal.record(Event::RaceDetected {
                worker: self.ctx.worker,
                artifact: RaceArtifact::DuplicateMark { question, generation },
            });
        }

        let remaining = state.questions_remaining().await;
        self.handles.sync.race_window().await;
        state.store_remaining(remaining - 1).await;
        state.note_mark_claimed();

        self.handles.journal.record(Event::MarkClaimed {
            worker: self.ctx.worker,
            question,
            remaining: remaining - 1,
            generation,
        });
        Some(Claim { student, generation })
    }

    // ========== 推进或等待 ==========

    async fn advance_or_wait(&mut self) -> GradingResult<Step> {
        if !self.ctx.may_advance {
            let token = self.handles.state.generation();
            return Ok(self.await_next_generation(token).await);
        }

        match self.try_advance().await? {
            Advance::Loaded => Ok(Step::Continue),
            Advance::Finished(reason) => Ok(Step::Exit(reason)),
            Advance::Pending { token } => match self.settings.advance_policy {
                AdvancePolicy::Coordinator => {
                    tokio::time::sleep(self.settings.poll_interval).await;
                    Ok(Step::Continue)
                }
                AdvancePolicy::AnyWorker => Ok(self.await_next_generation(token).await),
            },
        }
    }

    /// 在推进区域内判断当前试卷是否批完，批完则加载下一份
    async fn try_advance(&mut self) -> GradingResult<Advance> {
        let state = Arc::clone(&self.handles.state);
        let _guard = self.handles.sync.advance().await;

        if state.is_terminated() {
            if state.on_sentinel().await {
                info!("{} 哨兵试卷已批完，退出", self.ctx);
                return Ok(Advance::Finished(ExitReason::SentinelReached));
            }
            return Ok(Advance::Finished(ExitReason::Terminated));
        }

        let marks = state.marks_snapshot().await;
        // 未同步模式下计数不可信，只看标记
        let complete = match self.handles.sync.mode() {
            SyncMode::Guarded => marks.remaining() == 0,
            SyncMode::Unsynchronized => marks.all_marked(),
        };
        if !complete {
            return Ok(Advance::Pending {
                token: state.generation(),
            });
        }
        if marks.remaining() != 0 {
            self.handles.journal.record(Event::RaceDetected {
                worker: self.ctx.worker,
                artifact: RaceArtifact::RemainingMismatch {
                    remaining: marks.remaining(),
                },
            });
        }

        let index = state.exam_index();
        info!("{} 准备加载下一份试卷 (当前 index={})", self.ctx, index);
        if index + 1 >= state.total_exams() {
            if state.raise_termination() {
                self.handles.journal.record(Event::TerminationRaised {
                    worker: self.ctx.worker,
                    reason: "没有更多试卷".to_string(),
                });
            }
            info!("{} 没有更多试卷，退出", self.ctx);
            return Ok(Advance::Finished(ExitReason::ExamsExhausted));
        }

        self.handles.sync.race_window().await;
        let load = state
            .load_exam(
                index + 1,
                self.ctx.worker,
                &self.handles.exam_source,
                &self.handles.sync,
                &self.handles.journal,
            )
            .await?;
        self.summary.exams_advanced += 1;
        info!("{} 已加载试卷 (index={}, gen={})", self.ctx, load.index, load.generation);

        Ok(Advance::Loaded)
    }

    /// 代数屏障：等到代数不同于 `token` 或终止标志被置位
    async fn await_next_generation(&mut self, token: u64) -> Step {
        self.summary.barrier_waits += 1;
        self.handles.journal.record(Event::BarrierWait {
            worker: self.ctx.worker,
            token,
        });

        let mut signal = self.handles.state.subscribe();
        let mut polls: u32 = 0;
        loop {
            let current = *signal.borrow_and_update();
            if current.terminated {
                info!("{} 收到终止信号，退出", self.ctx);
                return Step::Exit(ExitReason::Terminated);
            }
            if current.generation != token {
                self.handles.journal.record(Event::BarrierReleased {
                    worker: self.ctx.worker,
                    generation: current.generation,
                    polls,
                });
                return Step::Continue;
            }

            polls = polls.saturating_add(1);
            // 通知到达或超时后都重新检查
            let _ = tokio::time::timeout(self.settings.poll_interval, signal.changed()).await;
        }
    }

    // ========== 辅助 ==========

    async fn pause(&mut self, range: DelayRange) {
        let delay = range.sample(&mut self.rng);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn finish(&mut self, reason: ExitReason) {
        self.summary.exit = Some(reason);
        self.handles.journal.record(Event::WorkerExited {
            worker: self.ctx.worker,
            reason,
        });
    }
}
