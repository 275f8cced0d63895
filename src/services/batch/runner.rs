//! 批量分析执行器
//!
//! 每只股票在独立的 tokio 任务里分析，单只股票的失败、超时或 panic 只会变成一条失败记录。
//! 并发度由 `buffer_unordered` 限制。

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::store::BatchJobStore;
use crate::config::BatchConfig;
use crate::error::{BatchError, Result};
use crate::models::{BatchJob, BatchProgress, BatchStatus, ItemOutcome};
use crate::services::analysis::AnalysisUnit;
use crate::services::upload::validate_stock_code;

#[derive(Clone)]
pub struct BatchRunner {
    store: Arc<BatchJobStore>,
    unit: Arc<dyn AnalysisUnit>,
    max_concurrency: usize,
    item_timeout: Duration,
}

/// 丢弃时中止任务，批次提前结束后不再继续分析剩余股票
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl BatchRunner {
    pub fn new(store: Arc<BatchJobStore>, unit: Arc<dyn AnalysisUnit>, config: &BatchConfig) -> Self {
        Self {
            store,
            unit,
            max_concurrency: config.max_concurrency.max(1),
            item_timeout: config.item_timeout(),
        }
    }

    pub fn store(&self) -> &Arc<BatchJobStore> {
        &self.store
    }

    /// 提交批次
    ///
    /// 校验通过后创建批次并置为 running，后台开始分析，立即返回批次 id
    pub async fn submit(&self, items: Vec<String>, chart_type: String) -> Result<String> {
        if items.is_empty() {
            return Err(BatchError::InvalidInput("股票列表为空".to_string()));
        }
        for code in &items {
            validate_stock_code(code)?;
        }

        let mut seen = HashSet::new();
        let items: Vec<String> = items
            .into_iter()
            .filter(|code| seen.insert(code.clone()))
            .collect();
        let total = items.len();

        let id = format!("batch_{}", Uuid::new_v4().simple());
        self.store
            .create(BatchJob::new(id.clone(), items, chart_type.clone()))
            .await?;
        self.store.set_status(&id, BatchStatus::Running, None).await?;

        log::info!(
            "批量分析开始: batch_id={}, 股票数={}, 图表周期={}",
            id,
            total,
            chart_type
        );

        let runner = self.clone();
        let batch_id = id.clone();
        tokio::spawn(async move {
            runner.run(batch_id).await;
        });

        Ok(id)
    }

    async fn run(&self, id: String) {
        match self.process(&id).await {
            Ok(progress) => {
                log::info!(
                    "批量分析完成: batch_id={}, 成功={}, 失败={}",
                    id,
                    progress.completed_count,
                    progress.failed_count
                );
            }
            Err(e) => {
                log::error!("批量分析中止: batch_id={}, 错误: {}", id, e);
                if let Err(e) = self.store.fail_job(&id, &e.to_string()).await {
                    log::error!("无法将批次标记为失败: batch_id={}, 错误: {}", id, e);
                }
            }
        }
    }

    async fn process(&self, id: &str) -> Result<BatchProgress> {
        let job = self.store.get(id).await?;
        let chart_type = job.chart_type.clone();

        let mut outcomes = stream::iter(job.items.clone())
            .map(|code| self.analyze_item(code, chart_type.clone()))
            .buffer_unordered(self.max_concurrency);

        let mut snapshot = job.progress_snapshot();
        while let Some(outcome) = outcomes.next().await {
            let outcome = outcome?;
            snapshot = self.store.update_progress(id, outcome).await?;
            log::debug!(
                "批次进度: batch_id={}, {}/{} ({:.1}%)",
                id,
                snapshot.processed(),
                snapshot.total,
                snapshot.progress()
            );
        }

        if !snapshot.status.is_terminal() {
            return Err(BatchError::Internal(format!(
                "批次 {} 处理结束但仍有 {} 个条目没有结果",
                id,
                snapshot.total - snapshot.processed()
            )));
        }
        Ok(snapshot)
    }

    /// 分析单只股票
    ///
    /// 只有分析服务整体不可用时返回 `Err`，其余情况都转成结果记录
    async fn analyze_item(&self, stock_code: String, chart_type: String) -> Result<ItemOutcome> {
        let unit = self.unit.clone();
        let item_timeout = self.item_timeout;
        let (code, chart) = (stock_code.clone(), chart_type.clone());

        let mut task = AbortOnDrop(tokio::spawn(async move {
            tokio::time::timeout(item_timeout, unit.analyze(&code, &chart)).await
        }));

        let outcome = match (&mut task.0).await {
            Ok(Ok(Ok(payload))) => ItemOutcome::success(&stock_code, payload),
            Ok(Ok(Err(e))) if e.is_fatal() => {
                return Err(BatchError::JobFailure(e.to_string()));
            }
            Ok(Ok(Err(e))) => {
                log::warn!("股票 {} 分析失败: {}", stock_code, e);
                ItemOutcome::failure(&stock_code, &chart_type, e.to_string())
            }
            Ok(Err(_)) => {
                log::warn!("股票 {} 分析超时", stock_code);
                ItemOutcome::failure(
                    &stock_code,
                    &chart_type,
                    format!("分析超时（{:?}）", item_timeout),
                )
            }
            Err(e) => {
                log::error!("股票 {} 的分析任务异常终止: {}", stock_code, e);
                ItemOutcome::failure(&stock_code, &chart_type, format!("分析任务异常终止: {}", e))
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisPayload;
    use crate::services::analysis::AnalysisError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 可注入失败的分析服务
    #[derive(Default)]
    struct ScriptedUnit {
        fail: HashSet<String>,
        panic_on: HashSet<String>,
        hang_on: HashSet<String>,
        fatal_on: HashSet<String>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisUnit for ScriptedUnit {
        async fn analyze(
            &self,
            stock_code: &str,
            chart_type: &str,
        ) -> std::result::Result<AnalysisPayload, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;
            if self.hang_on.contains(stock_code) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on.contains(stock_code) {
                panic!("chart renderer crashed");
            }
            if self.fatal_on.contains(stock_code) {
                return Err(AnalysisError::Unavailable("401 Unauthorized".to_string()));
            }
            if self.fail.contains(stock_code) {
                return Err(AnalysisError::Failed(format!("{} 无行情数据", stock_code)));
            }
            Ok(AnalysisPayload {
                stock_name: format!("股票{}", stock_code),
                chart_type: chart_type.to_string(),
                analysis_score: 70.0,
                summary: "趋势向上".to_string(),
                detailed_analysis: "量价配合良好".to_string(),
            })
        }
    }

    fn codes(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{:06}", i)).collect()
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn runner(unit: Arc<ScriptedUnit>, max_concurrency: usize, item_timeout: Duration) -> BatchRunner {
        let config = BatchConfig {
            max_concurrency,
            ..BatchConfig::default()
        };
        let mut runner = BatchRunner::new(Arc::new(BatchJobStore::new()), unit, &config);
        runner.item_timeout = item_timeout;
        runner
    }

    async fn wait_terminal(runner: &BatchRunner, id: &str) -> BatchJob {
        for _ in 0..500 {
            let job = runner.store().get(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("批次 {} 没有在限定时间内结束", id);
    }

    #[tokio::test]
    async fn test_end_to_end_two_stocks() {
        let unit = Arc::new(ScriptedUnit::default());
        let runner = runner(unit, 4, Duration::from_secs(5));

        let id = runner
            .submit(vec!["005930".into(), "000660".into()], "day".into())
            .await
            .unwrap();
        assert!(id.starts_with("batch_"));

        let job = wait_terminal(&runner, &id).await;
        assert_eq!(job.status, BatchStatus::Completed);
        assert_eq!(job.total(), 2);
        assert_eq!(job.processed(), 2);
        assert_eq!(job.progress(), 100.0);

        let mut stocks: Vec<&str> = job.results.iter().map(|r| r.stock_code()).collect();
        stocks.sort();
        assert_eq!(stocks, vec!["000660", "005930"]);
    }

    #[tokio::test]
    async fn test_item_failures_are_isolated() {
        let unit = Arc::new(ScriptedUnit {
            fail: set(&["000002", "000005", "000009"]),
            ..ScriptedUnit::default()
        });
        let runner = runner(unit, 3, Duration::from_secs(5));

        let id = runner.submit(codes(10), "week".into()).await.unwrap();
        let job = wait_terminal(&runner, &id).await;

        assert_eq!(job.status, BatchStatus::Completed);
        assert_eq!(job.completed_count, 7);
        assert_eq!(job.failed_count, 3);
        assert!(job.error.is_none());
        for outcome in &job.results {
            let should_fail = ["000002", "000005", "000009"].contains(&outcome.stock_code());
            assert_eq!(outcome.error().is_some(), should_fail, "{:?}", outcome);
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let unit = Arc::new(ScriptedUnit {
            delay: Duration::from_millis(20),
            ..ScriptedUnit::default()
        });
        let runner = runner(unit.clone(), 3, Duration::from_secs(5));

        let id = runner.submit(codes(12), "day".into()).await.unwrap();
        wait_terminal(&runner, &id).await;

        let max = unit.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "最大并发 {}", max);
        assert!(max >= 2, "应当并发执行，实际 {}", max);
    }

    #[tokio::test]
    async fn test_timeout_and_panic_become_item_failures() {
        let unit = Arc::new(ScriptedUnit {
            hang_on: set(&["000001"]),
            panic_on: set(&["000002"]),
            ..ScriptedUnit::default()
        });
        let runner = runner(unit, 2, Duration::from_millis(50));

        let id = runner.submit(codes(4), "day".into()).await.unwrap();
        let job = wait_terminal(&runner, &id).await;

        assert_eq!(job.status, BatchStatus::Completed);
        assert_eq!(job.completed_count, 2);
        assert_eq!(job.failed_count, 2);

        let error_of = |code: &str| {
            job.results
                .iter()
                .find(|r| r.stock_code() == code)
                .and_then(|r| r.error())
                .unwrap()
                .to_string()
        };
        assert!(error_of("000001").contains("超时"));
        assert!(error_of("000002").contains("异常终止"));
    }

    #[tokio::test]
    async fn test_unavailable_service_fails_job() {
        let unit = Arc::new(ScriptedUnit {
            fatal_on: set(&["000001"]),
            delay: Duration::from_millis(5),
            ..ScriptedUnit::default()
        });
        let runner = runner(unit, 1, Duration::from_secs(5));

        let id = runner.submit(codes(5), "day".into()).await.unwrap();
        let job = wait_terminal(&runner, &id).await;

        assert_eq!(job.status, BatchStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("分析服务不可用"));
        assert_eq!(job.processed(), job.total());
        assert_eq!(job.completed_count, 0);
        assert_eq!(job.results.len(), 5);
    }

    #[tokio::test]
    async fn test_counters_are_monotonic_while_polling() {
        let unit = Arc::new(ScriptedUnit {
            fail: set(&["000004", "000008"]),
            delay: Duration::from_millis(5),
            ..ScriptedUnit::default()
        });
        let runner = runner(unit, 2, Duration::from_secs(5));
        let id = runner.submit(codes(16), "day".into()).await.unwrap();

        let mut last_processed = 0;
        let mut seen_statuses = Vec::new();
        loop {
            let job = runner.store().get(&id).await.unwrap();
            assert!(job.processed() >= last_processed);
            assert!(job.processed() <= job.total());
            assert_eq!(job.processed() == job.total(), job.status.is_terminal());
            last_processed = job.processed();
            if seen_statuses.last() != Some(&job.status) {
                seen_statuses.push(job.status);
            }
            if job.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(seen_statuses, vec![BatchStatus::Running, BatchStatus::Completed]);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_input_before_creating_job() {
        let unit = Arc::new(ScriptedUnit::default());
        let runner = runner(unit.clone(), 2, Duration::from_secs(5));

        let err = runner.submit(Vec::new(), "day".into()).await.unwrap_err();
        assert!(matches!(err, BatchError::InvalidInput(_)));

        let err = runner
            .submit(vec!["005930".into(), "59300".into()], "day".into())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidInput(_)));

        assert_eq!(runner.store().len().await, 0);
        assert_eq!(unit.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_codes_are_analyzed_once() {
        let unit = Arc::new(ScriptedUnit::default());
        let runner = runner(unit.clone(), 2, Duration::from_secs(5));

        let id = runner
            .submit(vec!["005930".into(), "005930".into(), "000660".into()], "day".into())
            .await
            .unwrap();
        let job = wait_terminal(&runner, &id).await;
        assert_eq!(job.total(), 2);
        assert_eq!(unit.calls.load(Ordering::SeqCst), 2);
    }
}
