use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use survey_relevance::cli::Cli;
use survey_relevance::utils::logging;
use survey_relevance::{
    AppError, CancelToken, Config, OpenAiCompatibleClient, PipelineDriver, RunOutcome,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 日志依赖配置，这之前的错误直接输出到 stderr
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ {:#}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = logging::init(&config.logging) {
        eprintln!("❌ 无法初始化日志: {}", err);
        std::process::exit(1);
    }

    if let Err(err) = run(&cli, config).await {
        error!("❌ {}", err);
        for cause in err.chain().skip(1) {
            error!("   原因: {}", cause);
        }
        std::process::exit(1);
    }
}

/// 默认值 → 配置文件 → 环境变量 → 命令行
fn load_config(cli: &Cli) -> Result<Config> {
    let base = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let config = cli.apply(base.apply_env()?);
    config.validate()?;
    Ok(config)
}

async fn run(cli: &Cli, config: Config) -> Result<()> {
    logging::log_startup(&config);

    let cancel = CancelToken::new();
    let _signal = cancel.cancel_on_ctrl_c();

    let client = Arc::new(OpenAiCompatibleClient::new(&config.llm));
    let driver = PipelineDriver::new(config, client, cancel, cli.resume_mode())?;

    match driver.run().await {
        Ok(RunOutcome::DryRun(_)) => Ok(()),
        Ok(RunOutcome::Completed(report)) => {
            info!("📊 统计文件: {}", report.summary_file.display());
            for path in &report.filtered_files {
                info!("📄 评级文件: {}", path.display());
            }
            Ok(())
        }
        Err(e @ AppError::Interrupted { .. }) => {
            warn!("💾 进度已保存，使用 --resume 继续");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
