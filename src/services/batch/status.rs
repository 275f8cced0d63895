//! 批次查询服务
//!
//! 只读：查询状态、结果和下载包，不会修改任何批次

use std::sync::Arc;

use super::artifact::{build_results_archive, DownloadArtifact};
use super::store::BatchJobStore;
use crate::error::{BatchError, Result};
use crate::models::{BatchJob, BatchResultsView, BatchStatusView};

#[derive(Clone)]
pub struct BatchStatusService {
    store: Arc<BatchJobStore>,
}

impl BatchStatusService {
    pub fn new(store: Arc<BatchJobStore>) -> Self {
        Self { store }
    }

    pub async fn get_status(&self, batch_id: &str) -> Result<BatchStatusView> {
        Ok(self.store.get(batch_id).await?.status_view())
    }

    /// 批次结果，结束之前不返回部分结果
    pub async fn get_results(&self, batch_id: &str) -> Result<BatchResultsView> {
        let job = self.terminal_job(batch_id).await?;
        Ok(job.results_view())
    }

    pub async fn get_download_artifact(&self, batch_id: &str) -> Result<DownloadArtifact> {
        let job = self.terminal_job(batch_id).await?;
        build_results_archive(&job)
    }

    /// 所有批次的状态，最新的在前
    pub async fn list(&self) -> Vec<BatchStatusView> {
        self.store
            .list()
            .await
            .iter()
            .map(BatchJob::status_view)
            .collect()
    }

    async fn terminal_job(&self, batch_id: &str) -> Result<BatchJob> {
        let job = self.store.get(batch_id).await?;
        if !job.status.is_terminal() {
            return Err(BatchError::JobNotTerminal(batch_id.to_string()));
        }
        Ok(job)
    }
}
