//! 应用共享状态

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BatchConfig;
use crate::services::analysis::AnalysisUnit;
use crate::services::batch::{BatchJobStore, BatchRunner, BatchStatusService};

/// 所有 worker 共享的服务实例
pub struct AppState {
    pub runner: BatchRunner,
    pub status: BatchStatusService,
    pub unit: Arc<dyn AnalysisUnit>,
    /// 单只股票同步分析的超时时间
    pub item_timeout: Duration,
    pub max_upload_bytes: usize,
    pub stock_list_path: PathBuf,
}

impl AppState {
    pub fn new(unit: Arc<dyn AnalysisUnit>, config: &BatchConfig) -> Self {
        let store = Arc::new(BatchJobStore::new());
        Self {
            runner: BatchRunner::new(store.clone(), unit.clone(), config),
            status: BatchStatusService::new(store),
            unit,
            item_timeout: config.item_timeout(),
            max_upload_bytes: config.max_upload_bytes,
            stock_list_path: PathBuf::from(&config.stock_list_path),
        }
    }

    pub fn store(&self) -> &Arc<BatchJobStore> {
        self.runner.store()
    }
}
