//! 结果下载包
//!
//! ZIP 内包含 `<batch_id>_results.json`（全部结果）和 `<batch_id>_summary.txt`（文字汇总）

use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;
use crate::models::{BatchJob, ItemOutcome};

const RULE: &str = "==================================================";

/// 可下载的结果文件
#[derive(Debug, Clone)]
pub struct DownloadArtifact {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// 打包批次结果
pub fn build_results_archive(job: &BatchJob) -> Result<DownloadArtifact> {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file(format!("{}_results.json", job.id), options)?;
    zip.write_all(&serde_json::to_vec_pretty(&job.results)?)?;

    zip.start_file(format!("{}_summary.txt", job.id), options)?;
    zip.write_all(render_summary(job).as_bytes())?;

    let cursor = zip.finish()?;
    Ok(DownloadArtifact {
        filename: format!("{}_results.zip", job.id),
        content_type: "application/zip",
        bytes: cursor.into_inner(),
    })
}

/// 生成文字汇总
pub fn render_summary(job: &BatchJob) -> String {
    let view = job.status_view();
    let mut lines = vec![
        RULE.to_string(),
        "AI 股票图表分析结果汇总".to_string(),
        RULE.to_string(),
        String::new(),
        format!("批次 ID: {}", view.batch_id),
        format!("图表周期: {}", view.chart_type),
        format!("状态: {}", view.status.label()),
        format!("开始时间: {}", view.start_time),
        format!("结束时间: {}", view.end_time.as_deref().unwrap_or("N/A")),
        format!("股票总数: {}", view.total),
        format!("成功: {}", view.completed),
        format!("失败: {}", view.failed),
        format!("进度: {:.1}%", view.progress),
    ];
    if let Some(error) = &view.error {
        lines.push(format!("错误: {}", error));
    }
    lines.extend([
        String::new(),
        RULE.to_string(),
        "个股分析结果".to_string(),
        RULE.to_string(),
        String::new(),
    ]);

    for (index, outcome) in job.results.iter().enumerate() {
        lines.push(format!("{}. 股票代码: {}", index + 1, outcome.stock_code()));
        match outcome {
            ItemOutcome::Success(item) => {
                lines.push(format!("   名称: {}", item.analysis.stock_name));
                lines.push(format!("   评分: {}", item.analysis.analysis_score));
                lines.push(format!("   摘要: {}", item.analysis.summary));
            }
            ItemOutcome::Failure(item) => {
                lines.push("   评分: 0".to_string());
                lines.push(format!("   错误: {}", item.error));
            }
        }
        lines.push(String::new());
    }

    lines.join("\n")
}
