use anyhow::{Context, Result};
use clap::Parser;
use dirsync_lib::cli::Cli;
use dirsync_lib::logging::init_logging;
use dirsync_lib::SyncEngine;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // guard 需要活到进程结束，保证文件日志落盘
    let _guard = match init_logging(&cli.log_config()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("无法打开日志文件: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let engine = SyncEngine::new(cli.sync_config());

    if cli.list {
        return list(&engine, cli.verbose).await;
    }

    let report = engine.run().await.context("同步失败")?;

    if cli.json {
        let mut stdout = io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &report).context("输出报告失败")?;
        writeln!(stdout)?;
    }
    Ok(())
}

/// 打印两棵树的清单
async fn list(engine: &SyncEngine, detailed: bool) -> Result<()> {
    engine.check_roots().context("根目录检查失败")?;
    let (source, destination) = engine
        .build_inventories()
        .await
        .context("构建清单失败")?;

    let mut stdout = io::stdout().lock();
    for (label, outcome) in [("source", &source), ("destination", &destination)] {
        writeln!(stdout, "# {} ({})", label, outcome.inventory.root())?;
        if detailed {
            outcome.inventory.display_detailed(&mut stdout)?;
        } else {
            outcome.inventory.display(&mut stdout)?;
        }
    }
    Ok(())
}
