//! 命令行参数
//!
//! 位置参数：`<阅卷员数量> <评分标准文件> <试卷文件...>`，
//! 其余选项覆盖配置文件和环境变量中的同名配置。

use crate::config::{AdvancePolicy, Config, DelayRange, SyncMode};
use crate::error::GradingResult;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "marking_pool",
    version,
    about = "多名阅卷员共享评分标准，协同批改一系列试卷"
)]
pub struct Cli {
    /// 阅卷员数量
    pub workers: Option<usize>,

    /// 评分标准文件
    pub rubric: Option<PathBuf>,

    /// 按顺序批改的试卷文件
    pub exams: Vec<String>,

    /// TOML 配置文件
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 同步模式
    #[arg(long, value_enum)]
    pub mode: Option<SyncMode>,

    /// 推进策略
    #[arg(long, value_enum)]
    pub advance: Option<AdvancePolicy>,

    /// 评分标准行数（每份试卷的题目数）
    #[arg(long)]
    pub rubric_lines: Option<usize>,

    /// 每份试卷最多读取的行数
    #[arg(long)]
    pub exam_lines: Option<usize>,

    /// 每行评分标准被修改的概率
    #[arg(long)]
    pub change_probability: Option<f64>,

    /// 检查评分标准的延迟下限（毫秒）
    #[arg(long)]
    pub review_min_ms: Option<u64>,

    /// 检查评分标准的延迟上限（毫秒）
    #[arg(long)]
    pub review_max_ms: Option<u64>,

    /// 批改一道题的延迟下限（毫秒）
    #[arg(long)]
    pub marking_min_ms: Option<u64>,

    /// 批改一道题的延迟上限（毫秒）
    #[arg(long)]
    pub marking_max_ms: Option<u64>,

    /// 屏障轮询间隔（毫秒）
    #[arg(long)]
    pub poll_ms: Option<u64>,

    /// 终止哨兵学号
    #[arg(long)]
    pub sentinel: Option<i64>,

    /// 事件日志输出文件（JSON lines）
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// 随机数种子
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Cli {
    /// 合并配置：默认值 < 配置文件 < 环境变量 < 命令行
    pub fn into_config(self) -> GradingResult<Config> {
        let base = match &self.config {
            Some(path) => Config::from_toml_file(path)?,
            None => Config::default(),
        };
        let mut config = base.apply_env()?;
        self.overlay(&mut config);
        Ok(config)
    }

    fn overlay(self, config: &mut Config) {
        if let Some(v) = self.workers {
            config.worker_count = v;
        }
        if let Some(v) = self.rubric {
            config.rubric_path = v;
        }
        if !self.exams.is_empty() {
            config.exam_files = self.exams;
        }
        if let Some(v) = self.mode {
            config.sync_mode = v;
        }
        if let Some(v) = self.advance {
            config.advance_policy = v;
        }
        if let Some(v) = self.rubric_lines {
            config.rubric_lines = v;
        }
        if let Some(v) = self.exam_lines {
            config.exam_lines = v;
        }
        if let Some(v) = self.change_probability {
            config.rubric_change_probability = v;
        }
        config.review_delay = DelayRange::new(
            self.review_min_ms.unwrap_or(config.review_delay.min_ms),
            self.review_max_ms.unwrap_or(config.review_delay.max_ms),
        );
        config.marking_delay = DelayRange::new(
            self.marking_min_ms.unwrap_or(config.marking_delay.min_ms),
            self.marking_max_ms.unwrap_or(config.marking_delay.max_ms),
        );
        if let Some(v) = self.poll_ms {
            config.poll_interval_ms = v;
        }
        if let Some(v) = self.sentinel {
            config.sentinel_student = v;
        }
        if let Some(v) = self.events {
            config.events_path = Some(v);
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
    }
}
