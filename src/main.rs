use anyhow::{Context, Result};
use clap::Parser;
use marking_pool::cli::Cli;
use marking_pool::utils::logging;
use marking_pool::GradingSession;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Cli::parse().into_config().context("加载配置失败")?;

    // 初始化并运行阅卷会话
    let session = GradingSession::from_config(config)
        .await
        .context("初始化阅卷会话失败")?;
    session.run().await.context("阅卷过程中发生致命错误")?;

    Ok(())
}
