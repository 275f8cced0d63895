//! 批量分析命令行客户端
//!
//! 上传股票列表文件，轮询进度直到结束，完成后下载结果压缩包

use anyhow::{bail, Context};
use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chart_batch::client::{BatchApi, ClientPoller, HttpBatchApi, PollEvent};
use chart_batch::config::AppConfig;
use chart_batch::models::{default_chart_type, ItemOutcome};

#[derive(Debug, Parser)]
#[command(name = "batch-client", version, about = "股票图表批量分析客户端")]
struct Args {
    /// 服务地址
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    /// 股票列表文件（.txt，每行一个 6 位代码）
    #[arg(long)]
    file: PathBuf,

    /// 图表周期: day, week, month
    #[arg(long, default_value_t = default_chart_type())]
    chart_type: String,

    /// 轮询间隔（毫秒），默认取配置文件
    #[arg(long)]
    interval_ms: Option<u64>,

    #[arg(long, env = "API_KEY")]
    api_key: Option<String>,

    /// 结果压缩包保存路径，默认 `<batch_id>_results.zip`
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let args = Args::parse();
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("{:#}，使用默认配置", e);
        AppConfig::default()
    });

    let interval = args
        .interval_ms
        .map(|ms| Duration::from_millis(ms.max(1)))
        .unwrap_or_else(|| config.client.poll_interval());

    let data = std::fs::read(&args.file)
        .with_context(|| format!("读取文件失败: {}", args.file.display()))?;
    let filename = args
        .file
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string);

    let api = Arc::new(HttpBatchApi::new(
        &args.server,
        args.api_key.clone(),
        Duration::from_secs(config.analysis.timeout_secs),
    )?);
    let poller = ClientPoller::new(api.clone(), interval).with_max_upload_bytes(config.batch.max_upload_bytes);

    let mut session = poller
        .submit(filename.as_deref(), data, &args.chart_type)
        .await?;
    let batch_id = session.batch_id().to_string();
    println!("批次已提交: {}", batch_id);

    let mut completed = false;
    while let Some(event) = session.next_event().await {
        match event {
            PollEvent::Progress(status) => {
                println!(
                    "[{}] {:>5.1}%  成功 {}  失败 {}  共 {}",
                    status.status.label(),
                    status.progress,
                    status.completed,
                    status.failed,
                    status.total
                );
            }
            PollEvent::Completed(results) => {
                for outcome in &results.results {
                    match outcome {
                        ItemOutcome::Success(item) => println!(
                            "  {} {} 评分 {:.1}  {}",
                            item.stock_code,
                            item.analysis.stock_name,
                            item.analysis.analysis_score,
                            item.analysis.summary
                        ),
                        ItemOutcome::Failure(item) => {
                            println!("  {} 失败: {}", item.stock_code, item.error)
                        }
                    }
                }
                completed = true;
            }
            PollEvent::Failed { message, .. } => {
                bail!("批次 {} 失败: {}", batch_id, message);
            }
        }
    }

    if !completed {
        bail!("批次 {} 轮询中断", batch_id);
    }

    let archive = api.download(&batch_id).await?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}_results.zip", batch_id)));
    std::fs::write(&output, archive)
        .with_context(|| format!("保存结果失败: {}", output.display()))?;
    println!("结果已保存: {}", output.display());

    Ok(())
}
