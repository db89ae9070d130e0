/// 日志工具模块
///
/// 提供日志初始化和启动/结束信息的输出
use crate::config::Config;
use crate::orchestrator::RunReport;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 默认日志过滤规则
pub const DEFAULT_FILTER: &str = "marking_pool=info";

/// 初始化 tracing 日志
///
/// 优先使用 `RUST_LOG`，否则使用 [`DEFAULT_FILTER`]。重复调用不会报错。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 阅卷池启动 - {:?} 模式", config.sync_mode);
    info!("👥 阅卷员数量: {}", config.worker_count);
    info!("📋 推进策略: {:?}", config.advance_policy);
    info!("📄 试卷数量: {}", config.exam_files.len());
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(report: &RunReport, config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!("📊 阅卷完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📄 已加载试卷: {} (最终 index={}, gen={})", report.exams_loaded, report.exam_index, report.generation);
    info!("✅ 批改题数: {}", report.marks_claimed);
    info!("✏️ 评分标准修改: {}", report.rubric_writes);
    if report.has_race_artifacts() {
        info!("⚠️ 竞争现象: {}", report.race_artifacts);
    }
    info!("{}", "=".repeat(60));
    if let Some(path) = &config.events_path {
        info!("\n事件日志已保存至: {}", path.display());
    }
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
