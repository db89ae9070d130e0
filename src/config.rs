use crate::error::{GradingError, GradingResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// 同步模式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// 不加任何互斥，允许竞争（用于演示和检测数据竞争）
    Unsynchronized,
    /// 三个独立的互斥区域
    #[default]
    Guarded,
}

impl FromStr for SyncMode {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guarded" => Ok(SyncMode::Guarded),
            "unsynchronized" | "unsync" => Ok(SyncMode::Unsynchronized),
            other => Err(GradingError::invalid_config(format!("未知的同步模式: {}", other))),
        }
    }
}

/// 谁有权推进到下一份试卷
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AdvancePolicy {
    /// 只有 1 号阅卷员推进，其余阅卷员在代数屏障上等待
    #[default]
    Coordinator,
    /// 所有阅卷员在推进锁下竞争推进
    AnyWorker,
}

impl FromStr for AdvancePolicy {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "coordinator" => Ok(AdvancePolicy::Coordinator),
            "any_worker" => Ok(AdvancePolicy::AnyWorker),
            other => Err(GradingError::invalid_config(format!("未知的推进策略: {}", other))),
        }
    }
}

/// 随机延迟区间（毫秒，闭区间）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange { min_ms: 0, max_ms: 0 };

    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// 在区间内均匀抽取一个时长
    pub fn sample(&self, rng: &mut fastrand::Rng) -> Duration {
        let ms = if self.max_ms <= self.min_ms {
            self.min_ms
        } else {
            rng.u64(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(ms)
    }
}

/// 程序配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 并发阅卷员数量
    pub worker_count: usize,
    /// 同步模式
    pub sync_mode: SyncMode,
    /// 推进策略
    pub advance_policy: AdvancePolicy,
    /// 评分标准文件
    pub rubric_path: PathBuf,
    /// 按顺序批改的试卷文件
    pub exam_files: Vec<String>,
    /// 评分标准行数，同时也是每份试卷的题目数
    pub rubric_lines: usize,
    /// 每份试卷最多读取的行数
    pub exam_lines: usize,
    /// 每一行评分标准被修改的概率
    pub rubric_change_probability: f64,
    /// 检查评分标准时每行的思考时间
    pub review_delay: DelayRange,
    /// 批改一道题的时间
    pub marking_delay: DelayRange,
    /// 协调者让出和屏障轮询的间隔
    pub poll_interval_ms: u64,
    /// 终止哨兵学号
    pub sentinel_student: i64,
    /// 事件日志输出文件（JSON lines）
    pub events_path: Option<PathBuf>,
    /// 是否在内存中保留事件日志
    pub record_events: bool,
    /// 随机数种子
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: 3,
            sync_mode: SyncMode::Guarded,
            advance_policy: AdvancePolicy::Coordinator,
            rubric_path: PathBuf::from("rubric.txt"),
            exam_files: Vec::new(),
            rubric_lines: 5,
            exam_lines: 10,
            rubric_change_probability: 0.2,
            review_delay: DelayRange::new(500, 1000),
            marking_delay: DelayRange::new(1000, 2000),
            poll_interval_ms: 10,
            sentinel_student: 9999,
            events_path: None,
            record_events: false,
            seed: None,
        }
    }
}

impl Config {
    /// 从 TOML 文件加载配置，缺失字段取默认值
    pub fn from_toml_file(path: &Path) -> GradingResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GradingError::invalid_config(format!("无法读取配置文件 {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            GradingError::invalid_config(format!("无法解析配置文件 {}: {}", path.display(), e))
        })
    }

    /// 用进程环境变量覆盖配置
    pub fn apply_env(self) -> GradingResult<Self> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// 用给定的查找函数覆盖配置（便于测试）
    pub fn apply_env_with<F>(mut self, lookup: F) -> GradingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env_parse(&lookup, "MARKING_WORKERS")? {
            self.worker_count = v;
        }
        if let Some(v) = env_parse(&lookup, "MARKING_SYNC_MODE")? {
            self.sync_mode = v;
        }
        if let Some(v) = env_parse(&lookup, "MARKING_ADVANCE_POLICY")? {
            self.advance_policy = v;
        }
        if let Some(v) = lookup("MARKING_RUBRIC_PATH") {
            self.rubric_path = PathBuf::from(v);
        }
        if let Some(v) = env_parse(&lookup, "MARKING_RUBRIC_LINES")? {
            self.rubric_lines = v;
        }
        if let Some(v) = env_parse(&lookup, "MARKING_CHANGE_PROBABILITY")? {
            self.rubric_change_probability = v;
        }
        if let Some(v) = env_parse(&lookup, "MARKING_POLL_MS")? {
            self.poll_interval_ms = v;
        }
        if let Some(v) = env_parse(&lookup, "MARKING_SEED")? {
            self.seed = Some(v);
        }
        if let Some(v) = lookup("MARKING_EVENTS_PATH") {
            self.events_path = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    /// 启动前校验，任何一项不满足都是致命错误
    pub fn validate(&self) -> GradingResult<()> {
        if self.worker_count == 0 {
            return Err(GradingError::invalid_config("阅卷员数量必须大于 0"));
        }
        if self.exam_files.is_empty() {
            return Err(GradingError::invalid_config("试卷列表为空"));
        }
        if self.rubric_lines == 0 {
            return Err(GradingError::invalid_config("评分标准行数必须大于 0"));
        }
        if self.exam_lines == 0 {
            return Err(GradingError::invalid_config("试卷行数必须大于 0"));
        }
        if !(0.0..=1.0).contains(&self.rubric_change_probability) {
            return Err(GradingError::invalid_config(format!(
                "修改概率 {} 不在 [0, 1] 内",
                self.rubric_change_probability
            )));
        }
        for (name, range) in [("review_delay", self.review_delay), ("marking_delay", self.marking_delay)] {
            if range.min_ms > range.max_ms {
                return Err(GradingError::invalid_config(format!(
                    "{} 的最小值 {}ms 大于最大值 {}ms",
                    name, range.min_ms, range.max_ms
                )));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// 是否需要在内存中记录事件
    pub fn journal_enabled(&self) -> bool {
        self.record_events || self.events_path.is_some()
    }
}

fn env_parse<T, F>(lookup: &F, key: &str) -> GradingResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| GradingError::invalid_config(format!("环境变量 {} 的值 '{}' 无法解析", key, raw))),
    }
}
