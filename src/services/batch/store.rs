//! 批次任务存储
//!
//! 所有批次记录都放在一把读写锁后面。计数器、结果列表和状态在同一个临界区内修改，
//! 读取方拿到的是克隆出来的快照，不会看到只改了一半的记录。

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{BatchError, Result};
use crate::models::{BatchJob, BatchProgress, BatchStatus, ItemOutcome};

#[derive(Default)]
pub struct BatchJobStore {
    jobs: RwLock<HashMap<String, BatchJob>>,
}

impl BatchJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新批次，id 冲突视为内部错误
    pub async fn create(&self, job: BatchJob) -> Result<String> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(BatchError::Internal(format!("批次 id 冲突: {}", job.id)));
        }
        let id = job.id.clone();
        jobs.insert(id.clone(), job);
        Ok(id)
    }

    /// 获取批次快照
    pub async fn get(&self, id: &str) -> Result<BatchJob> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BatchError::NotFound(id.to_string()))
    }

    /// 所有批次快照，按开始时间倒序
    pub async fn list(&self) -> Vec<BatchJob> {
        let mut jobs: Vec<BatchJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|left, right| right.start_time.cmp(&left.start_time));
        jobs
    }

    /// 记录一个条目的处理结果
    ///
    /// 追加结果并递增对应计数；最后一个条目落地时在同一临界区内把批次置为 completed。
    /// 只返回计数快照。
    pub async fn update_progress(&self, id: &str, outcome: ItemOutcome) -> Result<BatchProgress> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| BatchError::NotFound(id.to_string()))?;

        if job.status != BatchStatus::Running {
            return Err(BatchError::InvalidStateTransition {
                from: job.status,
                to: BatchStatus::Running,
            });
        }
        if job.processed() >= job.total() {
            return Err(BatchError::Internal(format!(
                "批次 {} 的结果数超过条目总数 {}",
                id,
                job.total()
            )));
        }

        let stock_code = outcome.stock_code().to_string();
        if !job.record(outcome) {
            return Err(BatchError::Internal(format!(
                "批次 {} 重复记录了 {}",
                id, stock_code
            )));
        }

        if job.processed() == job.total() {
            job.status = BatchStatus::Completed;
            job.end_time = Some(Utc::now());
        }

        Ok(job.progress_snapshot())
    }

    /// 状态迁移，只允许 waiting → running → completed/failed
    ///
    /// 置为 failed 时与 `fail_job` 相同，未处理的条目全部记为失败
    pub async fn set_status(
        &self,
        id: &str,
        status: BatchStatus,
        error: Option<String>,
    ) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| BatchError::NotFound(id.to_string()))?;

        if !job.status.can_transition_to(status) {
            return Err(BatchError::InvalidStateTransition {
                from: job.status,
                to: status,
            });
        }

        match status {
            BatchStatus::Failed => {
                let reason = error.unwrap_or_else(|| "批次执行失败".to_string());
                mark_failed(job, &reason);
            }
            BatchStatus::Completed if job.processed() != job.total() => {
                return Err(BatchError::Internal(format!(
                    "批次 {} 仍有 {} 个条目未处理",
                    id,
                    job.total() - job.processed()
                )));
            }
            BatchStatus::Completed => {
                job.status = status;
                job.end_time = Some(Utc::now());
            }
            BatchStatus::Waiting | BatchStatus::Running => job.status = status,
        }
        Ok(())
    }

    /// 任务级失败
    ///
    /// 把所有尚未产生结果的条目记为失败，并把批次置为 failed，整个过程在一个临界区内完成
    pub async fn fail_job(&self, id: &str, reason: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| BatchError::NotFound(id.to_string()))?;

        if !job.status.can_transition_to(BatchStatus::Failed) {
            return Err(BatchError::InvalidStateTransition {
                from: job.status,
                to: BatchStatus::Failed,
            });
        }

        mark_failed(job, reason);
        Ok(())
    }

    /// 删除已结束的批次
    pub async fn remove(&self, id: &str) -> Result<BatchJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get(id)
            .ok_or_else(|| BatchError::NotFound(id.to_string()))?;
        if !job.status.is_terminal() {
            return Err(BatchError::JobNotTerminal(id.to_string()));
        }
        jobs.remove(id)
            .ok_or_else(|| BatchError::NotFound(id.to_string()))
    }

    /// 清理结束时间早于 `ttl` 之前的批次，返回清理数量
    pub async fn evict_expired(&self, ttl: Duration) -> usize {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(36500));
        let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
            return 0;
        };

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| match job.end_time {
            Some(end_time) if job.status.is_terminal() => end_time > cutoff,
            _ => true,
        });
        before - jobs.len()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

/// 未处理的条目记为失败后置为 failed，保证计数之和等于总数
fn mark_failed(job: &mut BatchJob, reason: &str) {
    for code in job.unprocessed_items() {
        let outcome = ItemOutcome::failure(&code, &job.chart_type, format!("未处理: {}", reason));
        job.record(outcome);
    }

    job.status = BatchStatus::Failed;
    job.error = Some(reason.to_string());
    job.end_time = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisPayload;
    use std::sync::Arc;

    fn job(id: &str, items: &[&str]) -> BatchJob {
        BatchJob::new(
            id.to_string(),
            items.iter().map(|s| s.to_string()).collect(),
            "day".to_string(),
        )
    }

    fn ok(code: &str) -> ItemOutcome {
        ItemOutcome::success(
            code,
            AnalysisPayload {
                stock_name: code.to_string(),
                chart_type: "day".to_string(),
                analysis_score: 60.0,
                summary: String::new(),
                detailed_analysis: String::new(),
            },
        )
    }

    async fn running_store(id: &str, items: &[&str]) -> BatchJobStore {
        let store = BatchJobStore::new();
        store.create(job(id, items)).await.unwrap();
        store.set_status(id, BatchStatus::Running, None).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let store = BatchJobStore::new();
        store.create(job("batch_a", &["005930"])).await.unwrap();
        let err = store.create(job("batch_a", &["000660"])).await.unwrap_err();
        assert!(matches!(err, BatchError::Internal(_)));
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let store = BatchJobStore::new();
        assert!(matches!(
            store.get("batch_missing").await,
            Err(BatchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_last_outcome_completes_job() {
        let store = running_store("batch_a", &["005930", "000660"]).await;

        let snapshot = store.update_progress("batch_a", ok("005930")).await.unwrap();
        assert_eq!(snapshot.status, BatchStatus::Running);
        assert_eq!(snapshot.progress(), 50.0);

        let snapshot = store
            .update_progress("batch_a", ItemOutcome::failure("000660", "day", "无数据"))
            .await
            .unwrap();
        assert_eq!(snapshot.status, BatchStatus::Completed);
        assert_eq!(snapshot.completed_count, 1);
        assert_eq!(snapshot.failed_count, 1);
        assert!(store.get("batch_a").await.unwrap().end_time.is_some());

        // 终态之后不再接受任何更新
        let err = store.update_progress("batch_a", ok("005930")).await.unwrap_err();
        assert!(matches!(err, BatchError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_status_only_moves_forward() {
        let store = BatchJobStore::new();
        store.create(job("batch_a", &["005930"])).await.unwrap();

        // waiting 不能跳过 running
        let err = store
            .set_status("batch_a", BatchStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidStateTransition { .. }));

        store.set_status("batch_a", BatchStatus::Running, None).await.unwrap();
        store
            .set_status("batch_a", BatchStatus::Failed, Some("存储不可用".into()))
            .await
            .unwrap();

        let err = store
            .set_status("batch_a", BatchStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BatchError::InvalidStateTransition {
                from: BatchStatus::Failed,
                to: BatchStatus::Running
            }
        ));
        assert_eq!(store.get("batch_a").await.unwrap().error.as_deref(), Some("存储不可用"));
    }

    #[tokio::test]
    async fn test_set_failed_fills_unprocessed_items() {
        let store = running_store("batch_a", &["005930", "000660", "035420"]).await;
        store.update_progress("batch_a", ok("005930")).await.unwrap();

        store
            .set_status("batch_a", BatchStatus::Failed, Some("存储不可用".into()))
            .await
            .unwrap();

        let job = store.get("batch_a").await.unwrap();
        assert!(job.status.is_terminal());
        assert_eq!(job.processed(), job.total());
        assert_eq!(job.completed_count, 1);
        assert_eq!(job.failed_count, 2);
        assert!(job.unprocessed_items().is_empty());
        assert_eq!(job.results[1].error(), Some("未处理: 存储不可用"));

        // 未给出原因时使用默认信息
        let store = running_store("batch_b", &["005930"]).await;
        store.set_status("batch_b", BatchStatus::Failed, None).await.unwrap();
        let job = store.get("batch_b").await.unwrap();
        assert_eq!(job.processed(), 1);
        assert_eq!(job.error.as_deref(), Some("批次执行失败"));
    }

    #[tokio::test]
    async fn test_duplicate_outcome_is_rejected() {
        let store = running_store("batch_a", &["005930", "000660"]).await;
        store.update_progress("batch_a", ok("005930")).await.unwrap();

        let err = store.update_progress("batch_a", ok("005930")).await.unwrap_err();
        assert!(matches!(err, BatchError::Internal(_)));

        let job = store.get("batch_a").await.unwrap();
        assert_eq!(job.completed_count, 1);
        assert_eq!(job.results.len(), 1);
        assert_eq!(job.status, BatchStatus::Running);
    }

    #[tokio::test]
    async fn test_completed_requires_all_items() {
        let store = running_store("batch_a", &["005930", "000660"]).await;
        store.update_progress("batch_a", ok("005930")).await.unwrap();
        let err = store
            .set_status("batch_a", BatchStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Internal(_)));
    }

    #[tokio::test]
    async fn test_fail_job_marks_remaining_items() {
        let store = running_store("batch_a", &["005930", "000660", "035420"]).await;
        store.update_progress("batch_a", ok("000660")).await.unwrap();

        store.fail_job("batch_a", "分析服务不可用").await.unwrap();

        let job = store.get("batch_a").await.unwrap();
        assert_eq!(job.status, BatchStatus::Failed);
        assert_eq!(job.completed_count, 1);
        assert_eq!(job.failed_count, 2);
        assert_eq!(job.processed(), job.total());
        assert_eq!(job.error.as_deref(), Some("分析服务不可用"));
        assert!(job
            .results
            .iter()
            .filter(|r| !r.is_success())
            .all(|r| r.error().unwrap().starts_with("未处理")));
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_lose_increments() {
        let codes: Vec<String> = (0..200).map(|i| format!("{:06}", i)).collect();
        let store = Arc::new(BatchJobStore::new());
        store
            .create(BatchJob::new("batch_a".into(), codes.clone(), "day".into()))
            .await
            .unwrap();
        store.set_status("batch_a", BatchStatus::Running, None).await.unwrap();

        let mut handles = Vec::new();
        for (i, code) in codes.into_iter().enumerate() {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let outcome = if i % 3 == 0 {
                    ItemOutcome::failure(&code, "day", "注入失败")
                } else {
                    ok(&code)
                };
                store.update_progress("batch_a", outcome).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let job = store.get("batch_a").await.unwrap();
        assert_eq!(job.failed_count, 67);
        assert_eq!(job.completed_count, 133);
        assert_eq!(job.results.len(), 200);
        assert_eq!(job.status, BatchStatus::Completed);
    }

    #[tokio::test]
    async fn test_remove_and_evict() {
        let store = running_store("batch_a", &["005930"]).await;
        store.create(job("batch_b", &["000660"])).await.unwrap();

        // 运行中的批次不能删除
        assert!(matches!(
            store.remove("batch_a").await,
            Err(BatchError::JobNotTerminal(_))
        ));

        store.update_progress("batch_a", ok("005930")).await.unwrap();

        assert_eq!(store.evict_expired(Duration::from_secs(3600)).await, 0);
        assert_eq!(store.evict_expired(Duration::ZERO).await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("batch_b").await.is_ok());
    }
}
