use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use paper_digest::cli::{exit_code, exit_code_for, Cli, Command, RunArgs};
use paper_digest::config::Config;
use paper_digest::infrastructure::ChromeDesktop;
use paper_digest::orchestrator::{Collaborators, Orchestrator, RunOutcome};
use paper_digest::services::{ArxivSearch, DuckDuckGoSearch, LlmService, ThoughtWriter};
use paper_digest::utils::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match cli.command {
        Command::Run(args) => match run(args).await {
            Ok(code) => code,
            Err(e) => {
                error!("❌ {:#}", e);
                eprintln!("❌ {:#}", e);
                exit_code::FATAL
            }
        },
    };
    ExitCode::from(code)
}

async fn run(args: RunArgs) -> Result<u8> {
    // 加载配置：默认值 → 配置文件 → 环境变量 → 命令行
    let mut config = Config::load()?;
    args.apply_to(&mut config);

    // 初始化日志
    let log_file = logging::init(Path::new(&config.log_dir))?;
    info!("日志文件: {}", log_file.display());

    if let Err(message) = args.validate(&config) {
        error!("❌ 参数错误: {}", message);
        return Ok(exit_code::FATAL);
    }
    config.validate()?;

    let thoughts = if config.thoughts_enabled {
        ThoughtWriter::open(Path::new(&config.log_dir), true).unwrap_or_else(|e| {
            warn!("无法打开 thoughts 文件，已禁用: {}", e);
            ThoughtWriter::disabled()
        })
    } else {
        ThoughtWriter::disabled()
    };

    // 连接远程浏览器（唯一的稀缺资源持有者）
    let desktop = ChromeDesktop::connect(&config)
        .await
        .context("无法连接远程浏览器")?;

    let parts = Collaborators {
        source: Arc::new(ArxivSearch::new(&config)?),
        desktop: Arc::new(desktop),
        reasoning: Arc::new(LlmService::new(&config)),
        search: Arc::new(DuckDuckGoSearch::new(&config)?),
    };
    let orchestrator = Orchestrator::from_config(&config, parts, thoughts);

    // Ctrl-C → 取消所有任务
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏹ 收到 Ctrl-C，正在取消...");
            cancel.cancel();
        }
    });

    let result = orchestrator
        .run(&args.topic, args.num_papers(&config), args.num_vms(&config))
        .await;

    match &result {
        Ok(RunOutcome::Completed(summary)) => {
            println!(
                "✅ Included {} of {} requested papers: {}",
                summary.included,
                summary.requested,
                summary.report_path.display()
            );
        }
        Ok(RunOutcome::NoPapers) => println!("⚠️ No papers found for '{}'", args.topic),
        Ok(RunOutcome::NoSummaries { processed }) => {
            println!("⚠️ No summaries generated ({} papers failed)", processed)
        }
        Ok(RunOutcome::Cancelled) => println!("⏹ Run cancelled, no report written"),
        Err(e) => error!("❌ 运行失败: {}", e),
    }

    Ok(exit_code_for(&result))
}
