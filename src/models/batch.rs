//! 批量分析任务模型
//!
//! 定义批次状态、任务记录、单项结果以及对外返回的状态/结果视图

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::analysis::AnalysisPayload;
use super::response::to_beijing_time;

/// 批次状态
///
/// 只能沿 waiting → running → completed/failed 单向迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// 已创建，尚未开始
    Waiting,
    /// 分析中
    Running,
    /// 全部条目处理完毕
    Completed,
    /// 任务级故障导致提前结束
    Failed,
}

impl BatchStatus {
    /// 是否为终态（completed / failed）
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// 判断状态迁移是否合法
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// 界面显示文本
    pub fn label(self) -> &'static str {
        match self {
            Self::Waiting => "等待中",
            Self::Running => "分析中",
            Self::Completed => "已完成",
            Self::Failed => "失败",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单只股票分析成功的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemSuccess {
    /// 股票代码
    pub stock_code: String,
    /// 分析结果
    #[serde(flatten)]
    pub analysis: AnalysisPayload,
    /// 处理完成时间
    pub processed_at: String,
}

/// 单只股票分析失败的记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemFailure {
    pub stock_code: String,
    pub chart_type: String,
    /// 失败原因
    pub error: String,
    pub processed_at: String,
}

/// 单个条目的处理结果
///
/// 序列化时不带标签：失败记录一定带 `error` 字段
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ItemOutcome {
    Failure(ItemFailure),
    Success(ItemSuccess),
}

impl ItemOutcome {
    pub fn success(stock_code: &str, analysis: AnalysisPayload) -> Self {
        Self::Success(ItemSuccess {
            stock_code: stock_code.to_string(),
            analysis,
            processed_at: to_beijing_time(Utc::now()),
        })
    }

    pub fn failure(stock_code: &str, chart_type: &str, error: impl Into<String>) -> Self {
        Self::Failure(ItemFailure {
            stock_code: stock_code.to_string(),
            chart_type: chart_type.to_string(),
            error: error.into(),
            processed_at: to_beijing_time(Utc::now()),
        })
    }

    pub fn stock_code(&self) -> &str {
        match self {
            Self::Success(s) => &s.stock_code,
            Self::Failure(f) => &f.stock_code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(&f.error),
        }
    }
}

/// 批量分析任务记录
///
/// 由 `BatchJobStore` 独占持有，其他组件只拿到快照
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub id: String,
    pub status: BatchStatus,
    /// 提交顺序的股票代码
    pub items: Vec<String>,
    pub chart_type: String,
    pub completed_count: usize,
    pub failed_count: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// 按完成顺序排列
    pub results: Vec<ItemOutcome>,
    /// 任务级错误
    pub error: Option<String>,
    /// 已有结果的股票代码
    recorded: HashSet<String>,
}

/// 批次计数快照，不包含结果列表
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchProgress {
    pub status: BatchStatus,
    pub completed_count: usize,
    pub failed_count: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn processed(&self) -> usize {
        self.completed_count + self.failed_count
    }

    /// 进度百分比，范围 [0, 100]
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.processed() as f64 / self.total as f64 * 100.0
    }
}

impl BatchJob {
    pub fn new(id: String, items: Vec<String>, chart_type: String) -> Self {
        Self {
            id,
            status: BatchStatus::Waiting,
            items,
            chart_type,
            completed_count: 0,
            failed_count: 0,
            start_time: Utc::now(),
            end_time: None,
            results: Vec::new(),
            error: None,
            recorded: HashSet::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// 已处理条目数（成功 + 失败）
    pub fn processed(&self) -> usize {
        self.completed_count + self.failed_count
    }

    /// 进度百分比，范围 [0, 100]
    pub fn progress(&self) -> f64 {
        self.progress_snapshot().progress()
    }

    pub fn progress_snapshot(&self) -> BatchProgress {
        BatchProgress {
            status: self.status,
            completed_count: self.completed_count,
            failed_count: self.failed_count,
            total: self.total(),
        }
    }

    /// 追加一条结果并更新计数
    ///
    /// 同一股票代码已有结果时不做修改，返回 false
    pub fn record(&mut self, outcome: ItemOutcome) -> bool {
        if !self.recorded.insert(outcome.stock_code().to_string()) {
            return false;
        }
        if outcome.is_success() {
            self.completed_count += 1;
        } else {
            self.failed_count += 1;
        }
        self.results.push(outcome);
        true
    }

    /// 尚未产生结果的股票代码，保持提交顺序
    pub fn unprocessed_items(&self) -> Vec<String> {
        let done: HashSet<&str> = self.results.iter().map(|r| r.stock_code()).collect();
        self.items
            .iter()
            .filter(|code| !done.contains(code.as_str()))
            .cloned()
            .collect()
    }

    pub fn status_view(&self) -> BatchStatusView {
        BatchStatusView {
            batch_id: self.id.clone(),
            status: self.status,
            chart_type: self.chart_type.clone(),
            progress: self.progress(),
            total: self.total(),
            completed: self.completed_count,
            failed: self.failed_count,
            start_time: to_beijing_time(self.start_time),
            end_time: self.end_time.map(to_beijing_time),
            error: self.error.clone(),
        }
    }

    pub fn results_view(&self) -> BatchResultsView {
        BatchResultsView {
            batch_id: self.id.clone(),
            status: self.status_view(),
            results: self.results.clone(),
            total_results: self.results.len(),
        }
    }
}

/// 批次状态查询结果
///
/// GET /api/batch/status/{batch_id}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchStatusView {
    pub batch_id: String,
    pub status: BatchStatus,
    pub chart_type: String,
    /// 进度百分比
    pub progress: f64,
    pub total: usize,
    /// 成功条目数
    pub completed: usize,
    /// 失败条目数
    pub failed: usize,
    /// 开始时间（ISO 8601）
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 批次结果查询结果
///
/// GET /api/batch/results/{batch_id}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchResultsView {
    pub batch_id: String,
    pub status: BatchStatusView,
    pub results: Vec<ItemOutcome>,
    pub total_results: usize,
}

/// 提交批次的响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub batch_id: String,
    pub message: String,
}
