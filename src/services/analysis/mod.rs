//! 图表分析服务
//!
//! `AnalysisUnit` 抽象了外部的 AI 图表分析：输入股票代码和图表周期，
//! 输出分析结果或错误。评分算法和图表生成都在外部服务中完成。

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::AnalysisPayload;

pub use http::HttpAnalysisUnit;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// 单只股票分析失败
    #[error("分析失败: {0}")]
    Failed(String),
    /// 分析服务整体不可用（未授权、服务下线），继续处理其余股票没有意义
    #[error("分析服务不可用: {0}")]
    Unavailable(String),
    #[error("请求分析服务失败: {0}")]
    Http(#[from] reqwest::Error),
}

impl AnalysisError {
    /// 是否需要终止整个批次
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// 单只股票分析
#[async_trait]
pub trait AnalysisUnit: Send + Sync {
    async fn analyze(
        &self,
        stock_code: &str,
        chart_type: &str,
    ) -> Result<AnalysisPayload, AnalysisError>;
}
