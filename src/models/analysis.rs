//! 图表分析数据模型

use serde::{Deserialize, Serialize};

/// 可选图表周期：(显示名称, 取值)
pub const CHART_TYPES: &[(&str, &str)] = &[("日K", "day"), ("周K", "week"), ("月K", "month")];

pub fn default_chart_type() -> String {
    "day".to_string()
}

/// 单只股票分析请求
///
/// POST /api/analyze/single/chart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// 6 位股票代码
    pub stock_code: String,
    /// 图表周期，原样透传给分析服务
    #[serde(default = "default_chart_type")]
    pub chart_type: String,
}

/// 分析服务返回的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisPayload {
    /// 股票名称
    pub stock_name: String,
    pub chart_type: String,
    /// 综合评分（0-100）
    pub analysis_score: f64,
    /// 摘要
    pub summary: String,
    /// 详细分析
    pub detailed_analysis: String,
}

/// 预置股票列表
///
/// GET /api/stocks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockListResponse {
    pub stocks: Vec<String>,
}

/// 图表周期选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartTypeOption {
    pub name: String,
    pub value: String,
}

impl ChartTypeOption {
    pub fn all() -> Vec<Self> {
        CHART_TYPES
            .iter()
            .map(|(name, value)| Self {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect()
    }
}
